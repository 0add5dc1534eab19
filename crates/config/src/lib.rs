#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for pkgd
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded, per backend flavour)
//! - Configuration file (~/.config/pkgd/config.toml)
//! - Environment variables

pub mod constants;

use pkgd_errors::{ConfigError, Error};
use pkgd_types::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub backend: BackendKind,
}

/// Supervision of native commit processes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds without status-channel activity before the child is interrupted
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Seconds between the interrupt and a hard kill
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_secs: u64,
    #[serde(default = "default_output_limit")]
    pub output_limit_bytes: usize,
}

/// System lock acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_wait")]
    pub wait_secs: u64,
    #[serde(default = "default_lock_retry_interval")]
    pub retry_interval_ms: u64,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub lock_file: Option<PathBuf>,
    pub state_files: Option<Vec<PathBuf>>,
    pub archives_dir: Option<PathBuf>,
    pub reboot_required: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

// Default implementations

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            poll_interval_ms: default_poll_interval(),
            terminate_grace_secs: default_terminate_grace(),
            output_limit_bytes: default_output_limit(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_lock_wait(),
            retry_interval_ms: default_lock_retry_interval(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            retries: 3,
            retry_delay: 1, // 1 second
        }
    }
}

// Default value functions for serde
fn default_inactivity_timeout() -> u64 {
    600 // 10 minutes
}

fn default_poll_interval() -> u64 {
    100
}

fn default_terminate_grace() -> u64 {
    5
}

fn default_output_limit() -> usize {
    64 * 1024
}

fn default_lock_wait() -> u64 {
    5
}

fn default_lock_retry_interval() -> u64 {
    250
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

impl SupervisorConfig {
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }
}

impl LockConfig {
    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("pkgd").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, if the contents are not
    /// valid TOML, or if the values fail validation.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // PKGD_BACKEND
        if let Ok(backend) = std::env::var("PKGD_BACKEND") {
            self.general.backend = backend.parse().map_err(|_| ConfigError::InvalidValue {
                field: "PKGD_BACKEND".to_string(),
                value: backend,
            })?;
        }

        // PKGD_INACTIVITY_TIMEOUT
        if let Ok(timeout) = std::env::var("PKGD_INACTIVITY_TIMEOUT") {
            self.supervisor.inactivity_timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "PKGD_INACTIVITY_TIMEOUT".to_string(),
                    value: timeout,
                })?;
        }

        // PKGD_LOCK_WAIT
        if let Ok(wait) = std::env::var("PKGD_LOCK_WAIT") {
            self.lock.wait_secs = wait.parse().map_err(|_| ConfigError::InvalidValue {
                field: "PKGD_LOCK_WAIT".to_string(),
                value: wait,
            })?;
        }

        // PKGD_POLL_INTERVAL_MS
        if let Ok(interval) = std::env::var("PKGD_POLL_INTERVAL_MS") {
            self.supervisor.poll_interval_ms =
                interval.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "PKGD_POLL_INTERVAL_MS".to_string(),
                    value: interval,
                })?;
        }

        self.validate()
    }

    /// Reject values the engine cannot honour
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a poll interval above one
    /// second, a zero poll interval or a zero inactivity timeout.
    pub fn validate(&self) -> Result<(), Error> {
        let poll = self.supervisor.poll_interval_ms;
        if poll == 0 || poll > constants::MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                field: "supervisor.poll_interval_ms".to_string(),
                value: poll.to_string(),
            }
            .into());
        }
        if self.supervisor.inactivity_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "supervisor.inactivity_timeout_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Get the system lock path (with default)
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.paths.lock_file.clone().unwrap_or_else(|| {
            PathBuf::from(match self.general.backend {
                BackendKind::Apt => constants::apt::LOCK_FILE,
                BackendKind::Yum => constants::yum::LOCK_FILE,
            })
        })
    }

    /// Files whose modification marks the package cache stale
    #[must_use]
    pub fn state_files(&self) -> Vec<PathBuf> {
        if let Some(files) = &self.paths.state_files {
            return files.clone();
        }
        let defaults: &[&str] = match self.general.backend {
            BackendKind::Apt => &[
                constants::apt::STATUS_DB,
                constants::apt::PKG_CACHE,
                constants::apt::SRC_PKG_CACHE,
            ],
            BackendKind::Yum => &[constants::yum::RPM_DB, constants::yum::PRIMARY_DB],
        };
        defaults.iter().map(PathBuf::from).collect()
    }

    /// Get the directory fetched artifacts land in (with default)
    #[must_use]
    pub fn archives_dir(&self) -> PathBuf {
        self.paths.archives_dir.clone().unwrap_or_else(|| {
            PathBuf::from(match self.general.backend {
                BackendKind::Apt => constants::apt::ARCHIVES_DIR,
                BackendKind::Yum => constants::yum::ARCHIVES_DIR,
            })
        })
    }

    #[must_use]
    pub fn reboot_required(&self) -> PathBuf {
        self.paths.reboot_required.clone().unwrap_or_else(|| {
            PathBuf::from(match self.general.backend {
                BackendKind::Apt => constants::apt::REBOOT_REQUIRED,
                BackendKind::Yum => constants::yum::REBOOT_REQUIRED,
            })
        })
    }

    #[must_use]
    pub fn catalog(&self) -> PathBuf {
        self.paths
            .catalog
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::CATALOG))
    }
}
