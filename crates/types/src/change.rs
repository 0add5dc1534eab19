//! Resolved change sets

use crate::PackageRef;
use pkgd_errors::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a transaction does to one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    Upgrade,
    Remove,
    Obsolete,
}

impl Action {
    /// Whether the package must be present after the transaction
    #[must_use]
    pub fn leaves_installed(self) -> bool {
        matches!(self, Self::Install | Self::Upgrade)
    }

    /// Whether the action needs an artifact fetched before apply
    #[must_use]
    pub fn needs_download(self) -> bool {
        self.leaves_installed()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Upgrade => write!(f, "upgrade"),
            Self::Remove => write!(f, "remove"),
            Self::Obsolete => write!(f, "obsolete"),
        }
    }
}

/// Ordered, deduplicated list of package actions.
///
/// A package may appear only once; adding it again with the same action is a
/// no-op and adding it with a different action is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: Vec<(PackageRef, Action)>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, keeping the set consistent.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConflictingActions` if the package is already
    /// present with a different action.
    pub fn push(&mut self, package: PackageRef, action: Action) -> Result<(), CacheError> {
        match self.entries.iter().find(|(p, _)| *p == package) {
            Some((_, existing)) if *existing == action => Ok(()),
            Some(_) => Err(CacheError::ConflictingActions {
                package: package.package_id(),
            }),
            None => {
                self.entries.push((package, action));
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PackageRef, Action)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn action_for(&self, package: &PackageRef) -> Option<Action> {
        self.entries
            .iter()
            .find(|(p, _)| p == package)
            .map(|(_, a)| *a)
    }

    /// Packages carrying the given action, in set order
    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &PackageRef> {
        self.entries
            .iter()
            .filter(move |(_, a)| *a == action)
            .map(|(p, _)| p)
    }

    /// Packages whose artifacts must be fetched
    pub fn downloads(&self) -> impl Iterator<Item = &PackageRef> {
        self.entries
            .iter()
            .filter(|(_, a)| a.needs_download())
            .map(|(p, _)| p)
    }

    #[must_use]
    pub fn needs_download(&self) -> bool {
        self.downloads().next().is_some()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a (PackageRef, Action);
    type IntoIter = std::slice::Iter<'a, (PackageRef, Action)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> PackageRef {
        PackageRef::new(name, "1.0", "amd64", "repoA")
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut set = ChangeSet::new();
        set.push(pkg("foo"), Action::Install).unwrap();
        set.push(pkg("libfoo"), Action::Install).unwrap();
        set.push(pkg("foo"), Action::Install).unwrap();
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.iter().map(|(p, _)| p.name.as_str()).collect();
        assert_eq!(names, ["foo", "libfoo"]);
    }

    #[test]
    fn conflicting_actions_are_rejected() {
        let mut set = ChangeSet::new();
        set.push(pkg("foo"), Action::Install).unwrap();
        let err = set.push(pkg("foo"), Action::Remove).unwrap_err();
        assert!(matches!(err, CacheError::ConflictingActions { .. }));
        assert_eq!(set.action_for(&pkg("foo")), Some(Action::Install));
    }

    #[test]
    fn removals_need_no_download() {
        let mut set = ChangeSet::new();
        set.push(pkg("bar"), Action::Remove).unwrap();
        assert!(!set.needs_download());
        set.push(pkg("foo"), Action::Upgrade).unwrap();
        assert_eq!(set.downloads().count(), 1);
    }
}
