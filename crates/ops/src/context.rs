//! Engine construction

use crate::Engine;
use pkgd_cache::{CacheProvider, CacheSession, CatalogProvider};
use pkgd_config::Config;
use pkgd_errors::{ConfigError, Error};
use pkgd_events::EventSender;
use pkgd_net::{Fetcher, HttpFetcher, NetClient, NetConfig};
use pkgd_platform::CancellationGate;
use pkgd_transaction::{native, CommitExecutor, CommitSettings, NativeBackend};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for [`Engine`]
///
/// Only the configuration and the event sender are required. The cache
/// provider, native backend and fetcher default to what the configuration
/// describes.
pub struct EngineBuilder {
    config: Option<Config>,
    events: Option<EventSender>,
    provider: Option<Arc<dyn CacheProvider>>,
    backend: Option<Arc<dyn NativeBackend>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    settings: Option<CommitSettings>,
    state_files: Option<Vec<PathBuf>>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            events: None,
            provider: None,
            backend: None,
            fetcher: None,
            settings: None,
            state_files: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Use `provider` instead of the catalog named by the configuration
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn CacheProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn NativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Override the lock, archive and supervision settings
    #[must_use]
    pub fn with_settings(mut self, settings: CommitSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Files whose modification marks the opened cache stale
    #[must_use]
    pub fn with_state_files(mut self, files: Vec<PathBuf>) -> Self {
        self.state_files = Some(files);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the event sender is missing,
    /// or if the default HTTP client cannot be created.
    pub fn build(self) -> Result<Engine, Error> {
        let config = self.config.ok_or_else(|| ConfigError::MissingField {
            field: "config".to_string(),
        })?;
        let events = self.events.ok_or_else(|| ConfigError::MissingField {
            field: "event_sender".to_string(),
        })?;

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(CatalogProvider::new(config.catalog())));
        let backend = self
            .backend
            .unwrap_or_else(|| native::for_kind(config.general.backend));
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let client = NetClient::new(NetConfig::from(&config.network))?;
                Arc::new(HttpFetcher::new(client))
            }
        };
        let settings = self
            .settings
            .unwrap_or_else(|| CommitSettings::from_config(&config));
        let state_files = self.state_files.unwrap_or_else(|| {
            let mut files = config.state_files();
            files.push(config.catalog());
            files
        });

        let gate = Arc::new(CancellationGate::new());
        let executor = CommitExecutor::new(
            backend,
            fetcher,
            Arc::clone(&gate),
            events.clone(),
            settings,
        );

        Ok(Engine::from_parts(
            CacheSession::new(provider, state_files),
            gate,
            executor,
            events,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_event_sender() {
        let err = EngineBuilder::new()
            .with_config(Config::default())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("event_sender"));
    }

    #[test]
    fn build_requires_config() {
        let (tx, _rx) = pkgd_events::channel();
        let err = EngineBuilder::new()
            .with_event_sender(tx)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("config"));
    }

    #[test]
    fn build_from_defaults() {
        let (tx, _rx) = pkgd_events::channel();
        let engine = EngineBuilder::new()
            .with_config(Config::default())
            .with_event_sender(tx)
            .build()
            .unwrap();
        assert!(!engine.is_busy());
    }
}
