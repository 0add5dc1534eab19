//! Filesystem timestamp helpers

use std::path::Path;
use std::time::SystemTime;

/// Modification time of `path`, `None` if it does not exist or is unreadable
#[must_use]
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Newest modification time among `paths`
#[must_use]
pub fn newest_mtime<P: AsRef<Path>>(paths: &[P]) -> Option<SystemTime> {
    paths.iter().filter_map(|p| modified_time(p.as_ref())).max()
}

/// Whether `path` exists and was modified after `since`
#[must_use]
pub fn modified_after(path: &Path, since: SystemTime) -> bool {
    modified_time(path).is_some_and(|mtime| mtime > since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_files_have_no_mtime() {
        let dir = tempfile::tempdir().unwrap();
        assert!(modified_time(&dir.path().join("absent")).is_none());
        assert!(!modified_after(&dir.path().join("absent"), SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn newest_mtime_picks_latest() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        std::fs::write(&old, "a").unwrap();
        std::fs::write(&new, "b").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(newest_mtime(&[&old, &new]), modified_time(&new));
        assert!(modified_after(&new, past));
    }
}
