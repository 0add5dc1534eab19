//! Filesystem locations of the native package managers
//!
//! Used whenever the `[paths]` table leaves a location unset.

pub mod apt {
    pub const LOCK_FILE: &str = "/var/lib/dpkg/lock-frontend";
    pub const STATUS_DB: &str = "/var/lib/dpkg/status";
    pub const PKG_CACHE: &str = "/var/cache/apt/pkgcache.bin";
    pub const SRC_PKG_CACHE: &str = "/var/cache/apt/srcpkgcache.bin";
    pub const ARCHIVES_DIR: &str = "/var/cache/apt/archives";
    pub const REBOOT_REQUIRED: &str = "/var/run/reboot-required";
}

pub mod yum {
    pub const LOCK_FILE: &str = "/var/run/yum.pid";
    pub const RPM_DB: &str = "/var/lib/rpm/Packages";
    pub const PRIMARY_DB: &str = "/var/cache/yum/primary.sqlite";
    pub const ARCHIVES_DIR: &str = "/var/cache/yum/packages";
    pub const REBOOT_REQUIRED: &str = "/var/run/reboot-required";
}

pub const CATALOG: &str = "/var/lib/pkgd/catalog.toml";

/// Upper bound for the supervisor poll interval
pub const MAX_POLL_INTERVAL_MS: u64 = 1000;
