//! Package identity

use pkgd_errors::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully resolved package.
///
/// Equality covers all four fields: the same name and architecture published
/// by two repositories are two different packages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub origin: String,
}

impl PackageRef {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            origin: origin.into(),
        }
    }

    /// Externally visible identifier: `name;version;arch;origin`
    #[must_use]
    pub fn package_id(&self) -> String {
        format!(
            "{};{};{};{}",
            self.name, self.version, self.arch, self.origin
        )
    }

    /// Same package name and architecture, any version or origin
    #[must_use]
    pub fn same_package(&self, other: &Self) -> bool {
        self.name == other.name && self.arch == other.arch
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package_id())
    }
}

impl FromStr for PackageRef {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(';').collect();
        match parts.as_slice() {
            [name, version, arch, origin] if !name.is_empty() => {
                Ok(Self::new(*name, *version, *arch, *origin))
            }
            _ => Err(CacheError::InvalidPackageId { id: s.to_string() }),
        }
    }
}
