//! TOML catalog implementing [`PackageCache`]
//!
//! A catalog lists candidate packages and the installed version of each:
//!
//! ```toml
//! [[package]]
//! name = "foo"
//! version = "1.0"
//! arch = "amd64"
//! origin = "repoA"
//! installed = "0.9"
//! depends = ["libfoo"]
//! conflicts = ["bar"]
//! url = "https://example.invalid/foo_1.0_amd64.deb"
//! blake3 = "…"
//!
//! [[source]]
//! url = "https://example.invalid/catalog.toml"
//! path = "catalog.toml"
//! ```
//!
//! Marking follows `depends` transitively, turns `conflicts` into removals and
//! removes reverse dependencies of deleted packages. A dependency with several
//! providers, none of them installed, leaves the requesting package in an
//! inconsistent state instead of picking one.

use crate::{CacheProvider, CachedPackage, IndexSource, MarkState, PackageCache, PendingChange};
use pkgd_errors::CacheError;
use pkgd_events::OperationProgress;
use pkgd_types::PackageRef;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_arch() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    name: String,
    version: String,
    #[serde(default = "default_arch")]
    arch: String,
    #[serde(default)]
    origin: String,
    #[serde(default)]
    installed: Option<String>,
    #[serde(default)]
    essential: bool,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    conflicts: Vec<String>,
    #[serde(default)]
    obsoletes: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    blake3: Option<String>,
}

impl CatalogEntry {
    fn candidate(&self) -> PackageRef {
        PackageRef::new(&self.name, &self.version, &self.arch, &self.origin)
    }

    fn provides(&self, dependency: &str) -> bool {
        self.name == dependency || self.provides.iter().any(|p| p == dependency)
    }

    fn is_up_to_date(&self) -> bool {
        self.installed.as_deref() == Some(self.version.as_str())
    }

    fn to_cached(&self) -> CachedPackage {
        CachedPackage {
            package: self.candidate(),
            installed_version: self.installed.clone(),
            essential: self.essential,
            summary: self.summary.clone(),
            url: self.url.clone(),
            digest: self.blake3.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SourceEntry {
    url: String,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "package")]
    packages: Vec<CatalogEntry>,
    #[serde(default, rename = "source")]
    sources: Vec<SourceEntry>,
}

fn parse_catalog(content: &str) -> Result<CatalogFile, CacheError> {
    toml::from_str(content).map_err(|e| CacheError::OpenFailed {
        message: format!("invalid catalog: {e}"),
    })
}

/// Catalog-backed package cache
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    entries: Vec<CatalogEntry>,
    marks: Vec<PendingChange>,
}

impl CatalogCache {
    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::OpenFailed` if the document is not a valid catalog.
    pub fn parse(content: &str) -> Result<Self, CacheError> {
        Ok(Self {
            entries: parse_catalog(content)?.packages,
            marks: Vec::new(),
        })
    }

    fn index_of(&self, package: &PackageRef) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.name == package.name
                && e.arch == package.arch
                && e.origin == package.origin
                && (e.version == package.version
                    || e.installed.as_deref() == Some(package.version.as_str()))
        })
    }

    /// Current mark for `name`/`arch`, ignoring inconsistent notes
    fn mark_of(&self, name: &str, arch: &str) -> Option<MarkState> {
        self.marks
            .iter()
            .rev()
            .find(|m| {
                m.package.name == name
                    && m.package.arch == arch
                    && m.state != MarkState::Inconsistent
            })
            .map(|m| m.state)
    }

    fn is_going_away(&self, entry: &CatalogEntry) -> bool {
        matches!(
            self.mark_of(&entry.name, &entry.arch),
            Some(MarkState::Delete | MarkState::Obsolete)
        )
    }

    /// Installed entries, first one per name and arch
    fn installed_indices(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.installed.is_some())
            .filter(|(_, e)| seen.insert((e.name.clone(), e.arch.clone())))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `dependency` holds once the current marks are applied
    fn is_satisfied(&self, dependency: &str) -> bool {
        let installed = self.installed_indices().into_iter().any(|i| {
            let e = &self.entries[i];
            e.provides(dependency) && !self.is_going_away(e)
        });
        if installed {
            return true;
        }
        self.marks
            .iter()
            .filter(|m| matches!(m.state, MarkState::Install | MarkState::Upgrade))
            .any(|m| {
                self.entries.iter().any(|e| {
                    e.name == m.package.name
                        && e.arch == m.package.arch
                        && e.version == m.package.version
                        && e.provides(dependency)
                })
            })
    }

    /// Candidate providers of `dependency`, first entry per name
    fn providers(&self, dependency: &str) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.provides(dependency) && !self.is_going_away(e))
            .filter(|(_, e)| seen.insert(e.name.clone()))
            .map(|(i, _)| i)
            .collect()
    }

    fn push(&mut self, package: PackageRef, state: MarkState, auto: bool, note: Option<String>) {
        self.marks.push(PendingChange {
            package,
            state,
            auto,
            note,
        });
    }

    fn mark_install_at(
        &mut self,
        index: usize,
        auto: bool,
        visiting: &mut HashSet<String>,
    ) -> Result<(), CacheError> {
        let entry = self.entries[index].clone();
        if !visiting.insert(entry.name.clone()) || entry.is_up_to_date() {
            return Ok(());
        }
        match self.mark_of(&entry.name, &entry.arch) {
            Some(MarkState::Install | MarkState::Upgrade) => return Ok(()),
            Some(MarkState::Delete | MarkState::Obsolete) => {
                return Err(CacheError::ConflictingActions {
                    package: entry.candidate().package_id(),
                })
            }
            _ => {}
        }

        let state = if entry.installed.is_some() {
            MarkState::Upgrade
        } else {
            MarkState::Install
        };
        self.push(entry.candidate(), state, auto, None);

        for obsoleted in &entry.obsoletes {
            for i in self.installed_indices() {
                let old = &self.entries[i];
                if old.name == *obsoleted && old.name != entry.name && !self.is_going_away(old) {
                    let package = self.installed_ref(i);
                    self.push(package, MarkState::Obsolete, true, None);
                }
            }
        }

        for i in self.installed_indices() {
            let other = &self.entries[i];
            if other.name == entry.name || self.is_going_away(other) {
                continue;
            }
            let conflicts = entry.conflicts.iter().any(|c| other.provides(c))
                || other.conflicts.iter().any(|c| entry.provides(c));
            if conflicts {
                self.mark_delete_at(i, true)?;
            }
        }

        for dependency in &entry.depends {
            if self.is_satisfied(dependency) {
                continue;
            }
            let providers = self.providers(dependency);
            match providers.as_slice() {
                [] => {
                    return Err(CacheError::MarkFailed {
                        package: entry.candidate().package_id(),
                        message: format!("depends on {dependency} which is not available"),
                    })
                }
                [single] => self.mark_install_at(*single, true, visiting)?,
                several => {
                    let names: Vec<&str> =
                        several.iter().map(|i| self.entries[*i].name.as_str()).collect();
                    let note = format!(
                        "dependency {dependency} has several providers: {}",
                        names.join(", ")
                    );
                    self.push(entry.candidate(), MarkState::Inconsistent, auto, Some(note));
                }
            }
        }

        Ok(())
    }

    fn mark_delete_at(&mut self, index: usize, auto: bool) -> Result<(), CacheError> {
        let entry = self.entries[index].clone();
        match self.mark_of(&entry.name, &entry.arch) {
            Some(MarkState::Delete | MarkState::Obsolete) => return Ok(()),
            Some(MarkState::Install | MarkState::Upgrade) => {
                return Err(CacheError::ConflictingActions {
                    package: entry.candidate().package_id(),
                })
            }
            _ => {}
        }
        if entry.installed.is_none() {
            return Err(CacheError::NotInstalled {
                package: entry.candidate().package_id(),
            });
        }

        let package = self.installed_ref(index);
        self.push(package, MarkState::Delete, auto, None);

        for i in self.installed_indices() {
            let dependent = &self.entries[i];
            if self.is_going_away(dependent) {
                continue;
            }
            let broken = dependent
                .depends
                .iter()
                .any(|d| entry.provides(d) && !self.is_satisfied(d));
            if broken {
                self.mark_delete_at(i, true)?;
            }
        }
        Ok(())
    }

    fn installed_ref(&self, index: usize) -> PackageRef {
        let entry = &self.entries[index];
        let version = entry.installed.as_deref().unwrap_or(&entry.version);
        PackageRef::new(&entry.name, version, &entry.arch, &entry.origin)
    }

    fn lookup(&self, package: &PackageRef) -> Result<usize, CacheError> {
        self.index_of(package).ok_or_else(|| CacheError::PackageNotFound {
            package: package.package_id(),
        })
    }
}

impl PackageCache for CatalogCache {
    fn broken_count(&self) -> usize {
        self.installed_indices()
            .into_iter()
            .filter(|i| {
                self.entries[*i]
                    .depends
                    .iter()
                    .any(|d| !self.is_satisfied(d))
            })
            .count()
    }

    fn packages(&self) -> Vec<CachedPackage> {
        self.entries.iter().map(CatalogEntry::to_cached).collect()
    }

    fn find(&self, package: &PackageRef) -> Option<CachedPackage> {
        self.index_of(package).map(|i| self.entries[i].to_cached())
    }

    fn find_by_name(&self, name: &str) -> Vec<CachedPackage> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .map(CatalogEntry::to_cached)
            .collect()
    }

    fn installed_version(&self, name: &str, arch: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.arch == arch && e.installed.is_some())
            .and_then(|e| e.installed.clone())
    }

    fn mark_install(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let index = self.lookup(package)?;
        self.mark_install_at(index, false, &mut HashSet::new())
    }

    fn mark_delete(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let index = self.lookup(package)?;
        self.mark_delete_at(index, false)
    }

    fn mark_upgrade(&mut self, package: &PackageRef) -> Result<(), CacheError> {
        let index = self.lookup(package)?;
        if self.entries[index].installed.is_none() {
            return Err(CacheError::NotInstalled {
                package: package.package_id(),
            });
        }
        self.mark_install_at(index, false, &mut HashSet::new())
    }

    fn upgrade_all(&mut self) -> Result<(), CacheError> {
        let mut seen = HashSet::new();
        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| seen.insert((e.name.clone(), e.arch.clone())))
            .filter(|(_, e)| e.installed.is_some() && !e.is_up_to_date())
            .map(|(i, _)| i)
            .collect();

        let mut visiting = HashSet::new();
        for index in candidates {
            self.mark_install_at(index, false, &mut visiting)?;
        }
        Ok(())
    }

    fn changes(&self) -> Vec<PendingChange> {
        self.marks.clone()
    }

    fn clear(&mut self) {
        self.marks.clear();
    }

    fn pending_count(&self) -> usize {
        self.marks.len()
    }
}

/// Opens a [`CatalogCache`] from a file on disk
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    path: PathBuf,
}

impl CatalogProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_source_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.path
            .parent()
            .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
    }
}

impl CacheProvider for CatalogProvider {
    fn open(
        &self,
        progress: &mut dyn OperationProgress,
    ) -> Result<Box<dyn PackageCache>, CacheError> {
        progress.update(0.0);
        let content = std::fs::read_to_string(&self.path).map_err(|e| CacheError::OpenFailed {
            message: format!("{}: {e}", self.path.display()),
        })?;
        progress.done();

        let catalog = parse_catalog(&content)?;
        progress.done();

        let cache = CatalogCache {
            entries: catalog.packages,
            marks: Vec::new(),
        };
        progress.done();

        let installed = cache.installed_indices().len();
        progress.done();

        tracing::debug!(
            path = %self.path.display(),
            packages = cache.entries.len(),
            installed,
            "catalog loaded"
        );
        progress.done();
        Ok(Box::new(cache))
    }

    fn index_sources(&self) -> Vec<IndexSource> {
        let catalog = match std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| parse_catalog(&content).map_err(|e| e.to_string()))
        {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read catalog sources");
                return Vec::new();
            }
        };

        catalog
            .sources
            .into_iter()
            .map(|s| IndexSource {
                destination: self.resolve_source_path(&s.path),
                url: s.url,
            })
            .collect()
    }
}
