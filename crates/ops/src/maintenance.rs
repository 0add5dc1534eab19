//! Cache refresh and fetch-only downloads

use crate::engine::{Engine, Progress};
use pkgd_errors::{CacheError, Error, TransactionError};
use pkgd_events::SteppedProgress;
use pkgd_net::FetchRequest;
use pkgd_transaction::{phase, FetchItem};
use pkgd_types::{Action, ChangeSet, PackageRef, Role, TransactionOutcome};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const REFRESH_PLAN: [(&str, f64); 3] = [
    (phase::CACHE, 10.0),
    (phase::FETCH, 85.0),
    (phase::REOPEN, 5.0),
];

const DOWNLOAD_PLAN: [(&str, f64); 3] = [
    (phase::CACHE, 10.0),
    (phase::FETCH, 85.0),
    (phase::COPY, 5.0),
];

impl Engine {
    /// Download fresh package indices and reopen the cache on them
    pub async fn refresh_cache(&mut self) -> TransactionOutcome {
        let mut tx = self.begin(Role::RefreshCache);
        let outcome = match self.refresh(&mut tx.progress).await {
            Ok(()) => TransactionOutcome::Success,
            Err(e) => self.failed(&e),
        };
        self.finish(tx, outcome)
    }

    /// Fetch the artifacts of `packages` into the directory `dest` without
    /// applying them.
    pub async fn download_packages(
        &mut self,
        packages: &[PackageRef],
        dest: &Path,
    ) -> TransactionOutcome {
        let mut tx = self.begin(Role::DownloadPackages);
        let outcome = match self.download(&mut tx.progress, packages, dest).await {
            Ok(files) => {
                info!(files = files.len(), dest = %dest.display(), "packages downloaded");
                TransactionOutcome::Success
            }
            Err(e) => self.failed(&e),
        };
        self.finish(tx, outcome)
    }

    async fn refresh(&mut self, progress: &mut Progress) -> Result<(), Error> {
        let _lock = self.executor.lock().await?;
        progress.plan(&REFRESH_PLAN);
        self.ensure_cache(progress)?;

        let items: Vec<FetchItem> = self
            .session
            .provider()
            .index_sources()
            .into_iter()
            .map(|source| FetchItem {
                package: None,
                summary: None,
                request: FetchRequest::new(source.url, source.destination),
                digest: None,
            })
            .collect();
        debug!(sources = items.len(), "refreshing package indices");

        progress.enter(phase::FETCH);
        self.executor.fetch(&items, progress).await?;
        progress.finish_phase();
        self.check_cancelled()?;

        progress.enter(phase::REOPEN);
        {
            let mut stepped = SteppedProgress::for_cache_open(progress);
            self.session.reload(&mut stepped)?;
        }
        progress.finish_phase();
        Ok(())
    }

    async fn download(
        &mut self,
        progress: &mut Progress,
        packages: &[PackageRef],
        dest: &Path,
    ) -> Result<Vec<PathBuf>, Error> {
        if !dest.is_dir() {
            return Err(TransactionError::InvalidDestination {
                path: dest.display().to_string(),
            }
            .into());
        }

        let _lock = self.executor.lock().await?;
        progress.plan(&DOWNLOAD_PLAN);
        self.ensure_cache(progress)?;
        self.check_cancelled()?;

        let mut changes = ChangeSet::new();
        {
            let cache = self.session.cache()?;
            for package in packages {
                if cache.find(package).is_none() {
                    return Err(CacheError::PackageNotFound {
                        package: package.package_id(),
                    }
                    .into());
                }
                changes.push(package.clone(), Action::Install)?;
            }
        }

        let archives = self.executor.settings().archives_dir.clone();
        let items = self
            .executor
            .download_items(self.session.cache()?, &changes, &archives)?;

        progress.enter(phase::FETCH);
        let artifacts = self.executor.fetch(&items, progress).await?;
        progress.finish_phase();
        self.executor.check_signatures(&artifacts).await?;
        self.check_cancelled()?;

        progress.enter(phase::COPY);
        let total = artifacts.len().max(1);
        let mut copied = Vec::with_capacity(artifacts.len());
        for (i, artifact) in artifacts.iter().enumerate() {
            self.check_cancelled()?;
            let Some(name) = artifact.path.file_name() else {
                continue;
            };
            let target = dest.join(name);
            tokio::fs::copy(&artifact.path, &target)
                .await
                .map_err(|e| Error::io_with_path(&e, &target))?;
            debug!(path = %target.display(), "copied");
            copied.push(target);
            #[allow(clippy::cast_precision_loss)]
            progress.update((i + 1) as f64 * 100.0 / total as f64);
        }
        progress.finish_phase();
        Ok(copied)
    }
}
