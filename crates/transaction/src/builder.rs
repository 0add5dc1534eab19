//! Marks requested packages and validates the resolved change set

use pkgd_cache::{MarkState, PackageCache, PendingChange};
use pkgd_errors::CacheError;
use pkgd_types::{Action, ChangeSet, PackageRef};

/// Builds one transaction's change set against an opened cache.
///
/// Policy lives here rather than with the caller: install-oriented requests
/// may not remove anything, ambiguous resolutions are rejected, and
/// essential packages are never removed.
pub struct TransactionBuilder<'a> {
    cache: &'a mut dyn PackageCache,
    allow_deps: bool,
    installing: bool,
}

impl<'a> TransactionBuilder<'a> {
    #[must_use]
    pub fn new(cache: &'a mut dyn PackageCache) -> Self {
        Self {
            cache,
            allow_deps: true,
            installing: false,
        }
    }

    /// Whether removals may take dependent packages with them
    #[must_use]
    pub fn allow_deps(mut self, allow: bool) -> Self {
        self.allow_deps = allow;
        self
    }

    /// # Errors
    ///
    /// Returns `PackageNotFound` for unknown references, `AlreadyInstalled`
    /// if this exact version is installed, or the cache's marking error.
    pub fn mark_install(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let found = self.lookup(package)?;
        if found.installed_version.as_deref() == Some(package.version.as_str()) {
            return Err(CacheError::AlreadyInstalled {
                package: package.package_id(),
            });
        }
        self.installing = true;
        self.cache.mark_install(&found.package)
    }

    /// # Errors
    ///
    /// Returns `PackageNotFound` for unknown references, `NotInstalled` if the
    /// version is not installed, `EssentialPackage` for essential packages,
    /// or the cache's marking error.
    pub fn mark_remove(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let found = self.lookup(package)?;
        if found.installed_version.as_deref() != Some(package.version.as_str()) {
            return Err(CacheError::NotInstalled {
                package: package.package_id(),
            });
        }
        if found.essential {
            return Err(CacheError::EssentialPackage {
                package: package.package_id(),
            });
        }
        self.cache.mark_delete(package)
    }

    /// # Errors
    ///
    /// Returns `PackageNotFound` for unknown references, `NotInstalled` if no
    /// version is installed, `AlreadyInstalled` if the installed version is
    /// the candidate, or the cache's marking error.
    pub fn mark_upgrade(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let found = self.lookup(package)?;
        if !found.is_installed() {
            return Err(CacheError::NotInstalled {
                package: package.package_id(),
            });
        }
        if !found.is_upgradable() {
            return Err(CacheError::AlreadyInstalled {
                package: package.package_id(),
            });
        }
        self.installing = true;
        self.cache.mark_upgrade(&found.package)
    }

    /// Mark every upgradable package
    ///
    /// # Errors
    ///
    /// Returns the cache's marking error.
    pub fn mark_system_upgrade(&mut self) -> Result<(), CacheError> {
        self.installing = true;
        self.cache.upgrade_all()
    }

    /// Resolved changes of every mark so far, validated against policy.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousResolution` for inconsistent resolutions,
    /// `ImplicitRemoval` when an install-oriented request removes packages,
    /// `HasDependents` when a removal drags in dependents without
    /// `allow_deps`, and `EssentialPackage` when an essential package would
    /// be removed.
    pub fn get_changes(&self) -> Result<ChangeSet, CacheError> {
        let pending = self.cache.changes();

        let ambiguous: Vec<&PendingChange> = pending
            .iter()
            .filter(|c| c.state == MarkState::Inconsistent)
            .collect();
        if !ambiguous.is_empty() {
            for change in &ambiguous {
                tracing::warn!(
                    package = %change.package,
                    note = change.note.as_deref().unwrap_or(""),
                    "ambiguous resolution"
                );
            }
            return Err(CacheError::AmbiguousResolution {
                packages: join_names(ambiguous.into_iter()),
            });
        }

        if self.installing {
            let removed: Vec<&PendingChange> = pending
                .iter()
                .filter(|c| c.state == MarkState::Delete)
                .collect();
            if !removed.is_empty() {
                return Err(CacheError::ImplicitRemoval {
                    packages: join_names(removed.into_iter()),
                });
            }
        } else if !self.allow_deps {
            if let Some(dependent) = pending.iter().find(|c| c.auto && c.state == MarkState::Delete) {
                return Err(CacheError::HasDependents {
                    package: dependent.package.package_id(),
                });
            }
        }

        let mut changes = ChangeSet::new();
        for change in pending {
            let action = match change.state {
                MarkState::Install => Action::Install,
                MarkState::Upgrade => Action::Upgrade,
                MarkState::Delete => Action::Remove,
                MarkState::Obsolete => Action::Obsolete,
                MarkState::Inconsistent => continue,
            };
            if !action.leaves_installed()
                && self.cache.find(&change.package).is_some_and(|p| p.essential)
            {
                return Err(CacheError::EssentialPackage {
                    package: change.package.package_id(),
                });
            }
            changes.push(change.package, action)?;
        }

        tracing::debug!(changes = changes.len(), "change set resolved");
        Ok(changes)
    }

    fn lookup(&self, package: &PackageRef) -> Result<pkgd_cache::CachedPackage, CacheError> {
        self.cache
            .find(package)
            .ok_or_else(|| CacheError::PackageNotFound {
                package: package.package_id(),
            })
    }
}

fn join_names<'c>(changes: impl Iterator<Item = &'c PendingChange>) -> String {
    changes
        .map(|c| c.package.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_cache::CatalogCache;

    const CATALOG: &str = r#"
[[package]]
name = "foo"
version = "1.0"
arch = "amd64"
origin = "repoA"
depends = ["libfoo"]

[[package]]
name = "libfoo"
version = "1.0"
arch = "amd64"
origin = "repoA"

[[package]]
name = "baz"
version = "1.0"
arch = "amd64"
origin = "repoA"
conflicts = ["bar"]

[[package]]
name = "bar"
version = "2.0"
arch = "amd64"
origin = "repoA"
installed = "2.0"

[[package]]
name = "libc6"
version = "2.36"
arch = "amd64"
origin = "repoA"
installed = "2.36"
essential = true
"#;

    fn pkg(name: &str, version: &str) -> PackageRef {
        PackageRef::new(name, version, "amd64", "repoA")
    }

    #[test]
    fn test_install_with_dependency() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        let mut builder = TransactionBuilder::new(&mut cache);
        builder.mark_install(&pkg("foo", "1.0")).unwrap();

        let changes = builder.get_changes().unwrap();
        let entries: Vec<_> = changes.iter().cloned().collect();
        assert_eq!(
            entries,
            vec![
                (pkg("foo", "1.0"), Action::Install),
                (pkg("libfoo", "1.0"), Action::Install)
            ]
        );
    }

    #[test]
    fn test_install_requiring_removal_is_rejected() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        let mut builder = TransactionBuilder::new(&mut cache);
        builder.mark_install(&pkg("baz", "1.0")).unwrap();

        let err = builder.get_changes().unwrap_err();
        assert!(matches!(err, CacheError::ImplicitRemoval { ref packages } if packages == "bar"));
    }

    #[test]
    fn test_essential_removal_is_rejected() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        let mut builder = TransactionBuilder::new(&mut cache);
        let err = builder.mark_remove(&pkg("libc6", "2.36")).unwrap_err();
        assert!(matches!(err, CacheError::EssentialPackage { .. }));
    }

    #[test]
    fn test_already_installed() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        let mut builder = TransactionBuilder::new(&mut cache);
        let err = builder.mark_install(&pkg("bar", "2.0")).unwrap_err();
        assert!(matches!(err, CacheError::AlreadyInstalled { .. }));
    }

    #[test]
    fn test_remove_not_installed() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        let mut builder = TransactionBuilder::new(&mut cache);
        let err = builder.mark_remove(&pkg("foo", "1.0")).unwrap_err();
        assert!(matches!(err, CacheError::NotInstalled { .. }));
    }
}
