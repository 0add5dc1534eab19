#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the pkgd transaction engine
//!
//! Errors are organized by domain. Every error maps onto the bounded
//! [`ErrorKind`] taxonomy reported to clients through [`Error::kind`].

use std::borrow::Cow;

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod kind;
pub mod network;
pub mod supervisor;
pub mod transaction;

pub use cache::CacheError;
pub use config::ConfigError;
pub use kind::ErrorKind;
pub use network::NetworkError;
pub use supervisor::SupervisorError;
pub use transaction::TransactionError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        #[cfg_attr(feature = "serde", serde(with = "io_kind_as_str"))]
        kind: std::io::ErrorKind,
        message: String,
        #[cfg_attr(feature = "serde", serde(with = "opt_path_buf"))]
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Network(NetworkError::Cancelled)
        )
    }

    /// Position of this error in the client-visible taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Supervisor(err) => match err {
                SupervisorError::SpawnFailed { .. } => ErrorKind::SpawnError,
                SupervisorError::Killed { .. } => ErrorKind::Killed,
                SupervisorError::MalformedStatus { .. } => ErrorKind::MalformedStatus,
                SupervisorError::PackageFailed { .. }
                | SupervisorError::ExitFailure { .. }
                | SupervisorError::Io { .. } => ErrorKind::Internal,
            },
            Self::Cache(err) => match err {
                CacheError::OpenFailed { .. } | CacheError::NotOpen => ErrorKind::CacheOpenError,
                CacheError::PackageNotFound { .. } | CacheError::InvalidPackageId { .. } => {
                    ErrorKind::PackageNotFound
                }
                CacheError::NotInstalled { .. } => ErrorKind::PackageNotInstalled,
                CacheError::AlreadyInstalled { .. } => ErrorKind::PackageAlreadyInstalled,
                CacheError::EssentialPackage { .. } => ErrorKind::EssentialPackageProtected,
                CacheError::BrokenDependencies { .. }
                | CacheError::ImplicitRemoval { .. }
                | CacheError::AmbiguousResolution { .. }
                | CacheError::MarkFailed { .. }
                | CacheError::ConflictingActions { .. }
                | CacheError::HasDependents { .. } => ErrorKind::DependencyResolutionFailed,
            },
            Self::Transaction(err) => match err {
                TransactionError::LockUnavailable { .. } => ErrorKind::LockUnavailable,
                TransactionError::DownloadFailed { .. } => ErrorKind::DownloadFailed,
                TransactionError::SignatureFailed { .. } => ErrorKind::SignatureFailed,
                TransactionError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
                TransactionError::EmptyTransaction | TransactionError::InvalidDestination { .. } => {
                    ErrorKind::Internal
                }
            },
            Self::Network(err) => match err {
                NetworkError::ChecksumMismatch { .. } => ErrorKind::SignatureFailed,
                NetworkError::Cancelled => ErrorKind::Internal,
                _ => ErrorKind::DownloadFailed,
            },
            Self::Config(_) | Self::Internal(_) | Self::Cancelled | Self::Io { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(ConfigError::from(err))
    }
}

/// Result type alias for pkgd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for analytics / structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Supervisor(err) => err.user_message(),
            Error::Cache(err) => err.user_message(),
            Error::Transaction(err) => err.user_message(),
            Error::Network(err) => err.user_message(),
            Error::Config(err) => err.user_message(),
            Error::Io { message, .. } => Cow::Owned(message.clone()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Supervisor(err) => err.user_hint(),
            Error::Cache(err) => err.user_hint(),
            Error::Transaction(err) => err.user_hint(),
            Error::Network(err) => err.user_hint(),
            Error::Config(_) => Some("Check your pkgd configuration file."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Transaction(err) => err.is_retryable(),
            Error::Network(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Supervisor(err) => err.user_code(),
            Error::Cache(err) => err.user_code(),
            Error::Transaction(err) => err.user_code(),
            Error::Network(err) => err.user_code(),
            Error::Config(err) => err.user_code(),
            Error::Internal(_) => Some("error.internal"),
            Error::Cancelled => Some("error.cancelled"),
            Error::Io { .. } => Some("error.io"),
        }
    }
}

// Serde helper modules for optional path and io::ErrorKind as string
#[cfg(feature = "serde")]
mod io_kind_as_str {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(kind: &std::io::ErrorKind, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format!("{kind:?}"))
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<std::io::ErrorKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Best effort mapping; default to Other
        Ok(match s.as_str() {
            "NotFound" => std::io::ErrorKind::NotFound,
            "PermissionDenied" => std::io::ErrorKind::PermissionDenied,
            "ConnectionRefused" => std::io::ErrorKind::ConnectionRefused,
            "ConnectionReset" => std::io::ErrorKind::ConnectionReset,
            "ConnectionAborted" => std::io::ErrorKind::ConnectionAborted,
            "NotConnected" => std::io::ErrorKind::NotConnected,
            "AddrInUse" => std::io::ErrorKind::AddrInUse,
            "AddrNotAvailable" => std::io::ErrorKind::AddrNotAvailable,
            "BrokenPipe" => std::io::ErrorKind::BrokenPipe,
            "AlreadyExists" => std::io::ErrorKind::AlreadyExists,
            "WouldBlock" => std::io::ErrorKind::WouldBlock,
            "InvalidInput" => std::io::ErrorKind::InvalidInput,
            "InvalidData" => std::io::ErrorKind::InvalidData,
            "TimedOut" => std::io::ErrorKind::TimedOut,
            "WriteZero" => std::io::ErrorKind::WriteZero,
            "Interrupted" => std::io::ErrorKind::Interrupted,
            "Unsupported" => std::io::ErrorKind::Unsupported,
            "UnexpectedEof" => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        })
    }
}

#[cfg(feature = "serde")]
mod opt_path_buf {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(path: &Option<std::path::PathBuf>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match path {
            Some(pb) => s.serialize_some(&pb.display().to_string()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<std::path::PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        Ok(opt.map(std::path::PathBuf::from))
    }
}
