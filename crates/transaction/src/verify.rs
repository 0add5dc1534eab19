//! Post-commit verification

use pkgd_cache::PackageCache;
use pkgd_errors::TransactionError;
use pkgd_types::ChangeSet;

/// Check that every member of `changes` reached its expected state in a
/// freshly loaded cache.
///
/// # Errors
///
/// Returns `TransactionError::VerificationFailed` for the first package that
/// is not installed (or still installed) as expected.
pub fn verify_changes(cache: &dyn PackageCache, changes: &ChangeSet) -> Result<(), TransactionError> {
    for (package, action) in changes {
        let installed = cache.installed_version(&package.name, &package.arch);
        let present = installed.as_deref() == Some(package.version.as_str());

        if action.leaves_installed() && !present {
            return Err(TransactionError::VerificationFailed {
                package: package.name.clone(),
                expected: "installed".to_string(),
            });
        }
        if !action.leaves_installed() && present {
            return Err(TransactionError::VerificationFailed {
                package: package.name.clone(),
                expected: "removed".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_cache::CatalogCache;
    use pkgd_types::{Action, PackageRef};

    #[test]
    fn test_missing_install_is_reported() {
        let cache = CatalogCache::parse(
            r#"
[[package]]
name = "foo"
version = "1.0"
arch = "amd64"
origin = "repoA"
"#,
        )
        .unwrap();
        let mut changes = ChangeSet::new();
        changes
            .push(PackageRef::new("foo", "1.0", "amd64", "repoA"), Action::Install)
            .unwrap();

        let err = verify_changes(&cache, &changes).unwrap_err();
        assert_eq!(err.to_string(), "foo was not installed");
    }

    #[test]
    fn test_applied_changes_verify() {
        let cache = CatalogCache::parse(
            r#"
[[package]]
name = "foo"
version = "1.0"
arch = "amd64"
origin = "repoA"
installed = "1.0"

[[package]]
name = "bar"
version = "2.0"
arch = "amd64"
origin = "repoA"
"#,
        )
        .unwrap();
        let mut changes = ChangeSet::new();
        changes
            .push(PackageRef::new("foo", "1.0", "amd64", "repoA"), Action::Install)
            .unwrap();
        changes
            .push(PackageRef::new("bar", "2.0", "amd64", "repoA"), Action::Remove)
            .unwrap();

        verify_changes(&cache, &changes).unwrap();
    }
}
