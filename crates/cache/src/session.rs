//! Lifecycle of the opened package cache

use crate::{CacheProvider, PackageCache};
use pkgd_errors::CacheError;
use pkgd_events::OperationProgress;
use pkgd_platform::fs::newest_mtime;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Owns one opened cache and the timestamp it was opened at
pub struct CacheSession {
    provider: Arc<dyn CacheProvider>,
    state_files: Vec<PathBuf>,
    cache: Option<Box<dyn PackageCache>>,
    opened_at: Option<SystemTime>,
}

impl std::fmt::Debug for CacheSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSession")
            .field("state_files", &self.state_files)
            .field("open", &self.cache.is_some())
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

impl CacheSession {
    /// Create a session; nothing is opened until [`CacheSession::open`]
    #[must_use]
    pub fn new(provider: Arc<dyn CacheProvider>, state_files: Vec<PathBuf>) -> Self {
        Self {
            provider,
            state_files,
            cache: None,
            opened_at: None,
        }
    }

    /// Open (or reopen) the cache.
    ///
    /// A cache that opens with broken dependencies is discarded again; nothing
    /// can be resolved safely on top of it.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::OpenFailed` if the provider fails and
    /// `CacheError::BrokenDependencies` if the opened cache is inconsistent.
    pub fn open(&mut self, progress: &mut dyn OperationProgress) -> Result<(), CacheError> {
        self.cache = None;
        self.opened_at = None;

        let opened_at = SystemTime::now();
        let cache = self.provider.open(progress)?;
        let broken = cache.broken_count();
        if broken > 0 {
            tracing::warn!(broken, "package cache has broken dependencies");
            return Err(CacheError::BrokenDependencies { count: broken });
        }

        tracing::debug!(packages = cache.packages().len(), "package cache opened");
        self.cache = Some(cache);
        self.opened_at = Some(opened_at);
        Ok(())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.cache.is_some()
    }

    /// True when never opened or when a state file changed since the open
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let Some(opened_at) = self.opened_at else {
            return true;
        };
        newest_mtime(&self.state_files).is_some_and(|newest| newest > opened_at)
    }

    /// Reopen when stale or broken, otherwise only drop pending marks.
    ///
    /// # Errors
    ///
    /// Returns the error from [`CacheSession::open`] when a reopen fails.
    pub fn ensure_fresh(&mut self, progress: &mut dyn OperationProgress) -> Result<(), CacheError> {
        let broken = self.cache.as_ref().is_some_and(|c| c.broken_count() > 0);
        if self.cache.is_none() || broken || self.is_stale() {
            tracing::debug!(broken, "reopening package cache");
            return self.open(progress);
        }

        self.clear();
        progress.done();
        Ok(())
    }

    /// Discard pending marks without reopening
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    /// Discard the cache and open it again.
    ///
    /// # Errors
    ///
    /// Returns the error from [`CacheSession::open`].
    pub fn reload(&mut self, progress: &mut dyn OperationProgress) -> Result<(), CacheError> {
        tracing::debug!("reloading package cache");
        self.open(progress)
    }

    /// Drop the opened cache
    pub fn close(&mut self) {
        self.cache = None;
        self.opened_at = None;
    }

    /// # Errors
    ///
    /// Returns `CacheError::NotOpen` if the cache has not been opened.
    pub fn cache(&self) -> Result<&dyn PackageCache, CacheError> {
        self.cache.as_deref().ok_or(CacheError::NotOpen)
    }

    /// # Errors
    ///
    /// Returns `CacheError::NotOpen` if the cache has not been opened.
    pub fn cache_mut(&mut self) -> Result<&mut (dyn PackageCache + 'static), CacheError> {
        self.cache.as_deref_mut().ok_or(CacheError::NotOpen)
    }

    /// Number of pending marks, zero when closed
    #[must_use]
    pub fn pending_marks(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.pending_count())
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn CacheProvider> {
        &self.provider
    }

    #[must_use]
    pub fn state_files(&self) -> &[PathBuf] {
        &self.state_files
    }
}
