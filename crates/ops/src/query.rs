//! Read-only queries against the package cache

use crate::engine::{Engine, Progress};
use pkgd_cache::CachedPackage;
use pkgd_errors::{CacheError, Error};
use pkgd_events::EventEmitter;
use pkgd_transaction::phase;
use pkgd_types::{Filter, PackageInfo, PackageRef, Role, TransactionOutcome, TransactionStatus};
use std::collections::HashSet;
use tracing::debug;

const QUERY_PLAN: [(&str, f64); 2] = [(phase::CACHE, 20.0), (phase::QUERY, 80.0)];

impl Engine {
    /// Report every package whose name contains one of `terms`
    pub fn search_name(&mut self, filter: Filter, terms: &[String]) -> TransactionOutcome {
        let mut tx = self.begin(Role::SearchName);
        let result = self.query(&mut tx.progress, filter, |package| {
            terms
                .iter()
                .any(|term| package.package.name.contains(term.as_str()))
        });
        let outcome = match result {
            Ok(found) => {
                debug!(found, "search finished");
                TransactionOutcome::Success
            }
            Err(e) => self.failed(&e),
        };
        self.finish(tx, outcome)
    }

    /// Report the packages named exactly `names`.
    ///
    /// Fails with `PackageNotFound` when nothing matches.
    pub fn resolve(&mut self, filter: Filter, names: &[String]) -> TransactionOutcome {
        let mut tx = self.begin(Role::Resolve);
        let result = self
            .query(&mut tx.progress, filter, |package| {
                names.iter().any(|name| package.package.name == *name)
            })
            .and_then(|found| {
                if found == 0 {
                    Err(CacheError::PackageNotFound {
                        package: names.join(", "),
                    }
                    .into())
                } else {
                    Ok(())
                }
            });
        let outcome = match result {
            Ok(()) => TransactionOutcome::Success,
            Err(e) => self.failed(&e),
        };
        self.finish(tx, outcome)
    }

    /// Emit one `Package` event per match that passes `filter`. Returns the
    /// number of events emitted.
    fn query(
        &mut self,
        progress: &mut Progress,
        filter: Filter,
        matches: impl Fn(&CachedPackage) -> bool,
    ) -> Result<usize, Error> {
        progress.plan(&QUERY_PLAN);
        self.ensure_cache(progress)?;

        self.events.emit_status(TransactionStatus::Query);
        self.events.emit_allow_cancel(true);
        progress.enter(phase::QUERY);

        let packages = self.session.cache()?.packages();
        let total = packages.len().max(1);
        let mut seen = HashSet::new();
        for (i, cached) in packages.iter().enumerate() {
            self.check_cancelled()?;

            if matches(cached) {
                for (info, package) in listed(cached, filter) {
                    if seen.insert(package.package_id()) {
                        self.events
                            .emit_package(info, &package, Some(cached.summary.clone()));
                    }
                }
            }
            #[allow(clippy::cast_precision_loss)]
            progress.update((i + 1) as f64 * 100.0 / total as f64);
        }
        progress.finish_phase();
        Ok(seen.len())
    }
}

/// The installed version and the candidate, as far as `filter` lets them
/// through. A candidate equal to the installed version is only listed once.
fn listed(cached: &CachedPackage, filter: Filter) -> Vec<(PackageInfo, PackageRef)> {
    let mut out = Vec::new();
    if let Some(installed) = cached.installed_ref() {
        if filter.accepts(true) {
            out.push((PackageInfo::Installed, installed));
        }
    }
    let candidate_installed =
        cached.installed_version.as_deref() == Some(cached.package.version.as_str());
    if !candidate_installed && filter.accepts(false) {
        out.push((PackageInfo::Available, cached.package.clone()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(installed: Option<&str>) -> CachedPackage {
        CachedPackage {
            package: PackageRef::new("foo", "2.0", "amd64", "repoA"),
            installed_version: installed.map(str::to_string),
            essential: false,
            summary: "foo tool".to_string(),
            url: None,
            digest: None,
        }
    }

    #[test]
    fn upgradable_package_lists_both_versions() {
        let listed = listed(&cached(Some("1.0")), Filter::None);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, PackageInfo::Installed);
        assert_eq!(listed[0].1.version, "1.0");
        assert_eq!(listed[1].0, PackageInfo::Available);
        assert_eq!(listed[1].1.version, "2.0");
    }

    #[test]
    fn current_package_is_listed_once() {
        let listed = listed(&cached(Some("2.0")), Filter::None);
        assert_eq!(listed, vec![(PackageInfo::Installed, cached(None).package)]);
    }

    #[test]
    fn filters_select_installed_state() {
        assert!(listed(&cached(None), Filter::Installed).is_empty());
        assert_eq!(listed(&cached(None), Filter::NotInstalled).len(), 1);
        let installed_only = listed(&cached(Some("1.0")), Filter::Installed);
        assert_eq!(installed_only.len(), 1);
        assert_eq!(installed_only[0].0, PackageInfo::Installed);
    }
}
