#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package cache lifecycle for pkgd
//!
//! The package cache itself (dependency graph, version indices, repository
//! metadata) belongs to the native package manager and is reached through
//! [`PackageCache`] and [`CacheProvider`]. [`CacheSession`] owns one opened
//! cache for an engine: staleness checks, cheap mark clearing and reloads.
//! [`catalog`] provides a TOML-backed cache used by the CLI and the tests.

pub mod catalog;
mod session;

pub use catalog::{CatalogCache, CatalogProvider};
pub use session::CacheSession;

use pkgd_errors::CacheError;
use pkgd_events::OperationProgress;
use pkgd_types::PackageRef;
use std::path::PathBuf;

/// What the cache knows about one candidate package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPackage {
    /// The candidate version offered by `origin`
    pub package: PackageRef,
    pub installed_version: Option<String>,
    pub essential: bool,
    pub summary: String,
    /// Where the artifact for the candidate can be fetched from
    pub url: Option<String>,
    /// Hex BLAKE3 digest of the artifact
    pub digest: Option<String>,
}

impl CachedPackage {
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    /// Whether the candidate differs from what is installed
    #[must_use]
    pub fn is_upgradable(&self) -> bool {
        self.installed_version
            .as_deref()
            .is_some_and(|v| v != self.package.version)
    }

    /// Identity of the installed version, if any
    #[must_use]
    pub fn installed_ref(&self) -> Option<PackageRef> {
        self.installed_version.as_ref().map(|version| {
            PackageRef::new(
                &self.package.name,
                version,
                &self.package.arch,
                &self.package.origin,
            )
        })
    }
}

/// How the cache resolved a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkState {
    Install,
    Upgrade,
    Delete,
    Obsolete,
    /// Resolution could not pick a consistent outcome
    Inconsistent,
}

/// One package touched by the current marks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub package: PackageRef,
    pub state: MarkState,
    /// Marked as a consequence of another mark rather than by request
    pub auto: bool,
    pub note: Option<String>,
}

/// An index file refreshed by `RefreshCache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSource {
    pub url: String,
    pub destination: PathBuf,
}

/// An opened package cache with pending marks
pub trait PackageCache: Send {
    /// Number of installed packages with unsatisfied dependencies
    fn broken_count(&self) -> usize;

    fn packages(&self) -> Vec<CachedPackage>;

    /// Resolve a fully qualified reference, candidate or installed version
    fn find(&self, package: &PackageRef) -> Option<CachedPackage>;

    fn find_by_name(&self, name: &str) -> Vec<CachedPackage>;

    /// Installed version of `name` for `arch`
    fn installed_version(&self, name: &str, arch: &str) -> Option<String>;

    /// Mark for installation together with whatever it needs.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the package is unknown or cannot be marked.
    fn mark_install(&mut self, package: &PackageRef) -> Result<(), CacheError>;

    /// Mark for removal together with its reverse dependencies.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the package is unknown or cannot be marked.
    fn mark_delete(&mut self, package: &PackageRef) -> Result<(), CacheError>;

    /// Mark the candidate as an upgrade of the installed version.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the package is unknown or cannot be marked.
    fn mark_upgrade(&mut self, package: &PackageRef) -> Result<(), CacheError>;

    /// Mark every upgradable package.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if an upgrade cannot be marked.
    fn upgrade_all(&mut self) -> Result<(), CacheError>;

    /// Resolution of all marks so far, in marking order
    fn changes(&self) -> Vec<PendingChange>;

    /// Drop every pending mark
    fn clear(&mut self);

    fn pending_count(&self) -> usize {
        self.changes().len()
    }
}

/// Opens the native package cache
pub trait CacheProvider: Send + Sync {
    /// Load the cache, reporting each loading step through `progress`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::OpenFailed` if the cache cannot be loaded.
    fn open(&self, progress: &mut dyn OperationProgress) -> Result<Box<dyn PackageCache>, CacheError>;

    /// Index files a refresh downloads before the cache is reopened
    fn index_sources(&self) -> Vec<IndexSource> {
        Vec::new()
    }
}
