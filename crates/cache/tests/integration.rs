//! Integration tests for the cache session

#[cfg(test)]
mod tests {
    use pkgd_cache::*;
    use pkgd_errors::CacheError;
    use pkgd_types::PackageRef;
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

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
name = "editor"
version = "2.0"
arch = "amd64"
origin = "repoA"
installed = "1.0"

[[package]]
name = "mta"
version = "1.0"
arch = "amd64"
origin = "repoA"
depends = ["mail-transport"]

[[package]]
name = "postfix"
version = "3.0"
arch = "amd64"
origin = "repoA"
provides = ["mail-transport"]

[[package]]
name = "exim"
version = "4.0"
arch = "amd64"
origin = "repoA"
provides = ["mail-transport"]

[[source]]
url = "https://mirror.invalid/catalog.toml"
path = "lists/catalog.toml"
"#;

    struct Fixture {
        dir: TempDir,
        session: CacheSession,
    }

    impl Fixture {
        fn state_file(&self) -> std::path::PathBuf {
            self.dir.path().join("status")
        }
    }

    fn write_catalog(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn fixture(content: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("catalog.toml");
        write_catalog(&catalog, content);
        let status = dir.path().join("status");
        std::fs::write(&status, "").unwrap();
        set_mtime(&status, SystemTime::now() - Duration::from_secs(60));

        let provider = Arc::new(CatalogProvider::new(&catalog));
        let session = CacheSession::new(provider, vec![status, catalog]);
        // Opening must not see the catalog itself as newer than the open
        set_mtime(
            &dir.path().join("catalog.toml"),
            SystemTime::now() - Duration::from_secs(60),
        );
        Fixture { dir, session }
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    fn foo() -> PackageRef {
        PackageRef::new("foo", "1.0", "amd64", "repoA")
    }

    #[test]
    fn test_unopened_session_is_stale() {
        let fx = fixture(CATALOG);
        assert!(fx.session.is_stale());
        assert!(!fx.session.is_open());
        assert!(matches!(fx.session.cache(), Err(CacheError::NotOpen)));
        assert_eq!(fx.session.pending_marks(), 0);
    }

    #[test]
    fn test_open_then_state_change_is_stale() {
        let mut fx = fixture(CATALOG);
        fx.session.open(&mut ()).unwrap();
        assert!(!fx.session.is_stale());

        set_mtime(&fx.state_file(), SystemTime::now() + Duration::from_secs(30));
        assert!(fx.session.is_stale());
    }

    #[test]
    fn test_ensure_fresh_cheap_path_clears_marks() {
        let mut fx = fixture(CATALOG);
        fx.session.open(&mut ()).unwrap();
        fx.session.cache_mut().unwrap().mark_install(&foo()).unwrap();
        assert_eq!(fx.session.pending_marks(), 2);

        fx.session.ensure_fresh(&mut ()).unwrap();
        assert_eq!(fx.session.pending_marks(), 0);
        assert!(fx.session.is_open());
    }

    #[test]
    fn test_ensure_fresh_reopens_stale_cache() {
        let mut fx = fixture(CATALOG);
        fx.session.open(&mut ()).unwrap();

        let catalog = fx.dir.path().join("catalog.toml");
        write_catalog(
            &catalog,
            r#"
[[package]]
name = "only"
version = "1"
"#,
        );
        set_mtime(&catalog, SystemTime::now() + Duration::from_secs(30));

        fx.session.ensure_fresh(&mut ()).unwrap();
        let packages = fx.session.cache().unwrap().packages();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package.name, "only");
    }

    #[test]
    fn test_broken_dependencies_fail_open() {
        let mut fx = fixture(
            r#"
[[package]]
name = "app"
version = "1"
installed = "1"
depends = ["gone"]
"#,
        );
        let err = fx.session.open(&mut ()).unwrap_err();
        assert!(matches!(err, CacheError::BrokenDependencies { count: 1 }));
        assert!(!fx.session.is_open());
    }

    #[test]
    fn test_open_failure_on_invalid_catalog() {
        let mut fx = fixture("[[package]]\nname = 3\n");
        let err = fx.session.open(&mut ()).unwrap_err();
        assert!(matches!(err, CacheError::OpenFailed { .. }));
    }

    #[test]
    fn test_reload_discards_marks() {
        let mut fx = fixture(CATALOG);
        fx.session.open(&mut ()).unwrap();
        fx.session.cache_mut().unwrap().mark_install(&foo()).unwrap();

        fx.session.reload(&mut ()).unwrap();
        assert_eq!(fx.session.pending_marks(), 0);
    }

    #[test]
    fn test_several_providers_is_inconsistent() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        cache
            .mark_install(&PackageRef::new("mta", "1.0", "amd64", "repoA"))
            .unwrap();

        let changes = cache.changes();
        assert!(changes
            .iter()
            .any(|c| c.state == MarkState::Inconsistent && c.package.name == "mta"));
        assert!(changes.iter().all(|c| c.package.name != "postfix"));
    }

    #[test]
    fn test_upgrade_all_marks_upgradable() {
        let mut cache = CatalogCache::parse(CATALOG).unwrap();
        cache.upgrade_all().unwrap();

        let changes = cache.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].package.name, "editor");
        assert_eq!(changes[0].state, MarkState::Upgrade);
    }

    #[test]
    fn test_installed_version_is_findable() {
        let cache = CatalogCache::parse(CATALOG).unwrap();
        let installed = PackageRef::new("editor", "1.0", "amd64", "repoA");
        let found = cache.find(&installed).unwrap();
        assert!(found.is_upgradable());
        assert_eq!(found.installed_ref(), Some(installed));
        assert_eq!(cache.installed_version("editor", "amd64").as_deref(), Some("1.0"));
    }

    #[test]
    fn test_index_sources_resolve_relative_paths() {
        let fx = fixture(CATALOG);
        let provider = CatalogProvider::new(fx.dir.path().join("catalog.toml"));
        let sources = provider.index_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "https://mirror.invalid/catalog.toml");
        assert_eq!(sources[0].destination, fx.dir.path().join("lists/catalog.toml"));
    }
}
