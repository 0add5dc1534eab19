//! Commit-phase error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransactionError {
    #[error("could not acquire the package system lock {path}: {message}")]
    LockUnavailable { path: String, message: String },

    #[error("download failed: {message}")]
    DownloadFailed { message: String },

    #[error("signature check failed for {package}: {message}")]
    SignatureFailed { package: String, message: String },

    #[error("{package} was not {expected}")]
    VerificationFailed { package: String, expected: String },

    #[error("nothing to do")]
    EmptyTransaction,

    #[error("destination {path} is not a writable directory")]
    InvalidDestination { path: String },
}

impl UserFacingError for TransactionError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::LockUnavailable { .. } => {
                Cow::Borrowed("Only use one package management programme at the same time.")
            }
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::LockUnavailable { .. } => {
                Some("Close other package managers (apt, synaptic, yum) and retry.")
            }
            Self::DownloadFailed { .. } => Some("Check your network connection and retry."),
            Self::SignatureFailed { .. } => Some("Refresh the package cache; the mirror may be stale."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::DownloadFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::LockUnavailable { .. } => "transaction.lock_unavailable",
            Self::DownloadFailed { .. } => "transaction.download_failed",
            Self::SignatureFailed { .. } => "transaction.signature_failed",
            Self::VerificationFailed { .. } => "transaction.verification_failed",
            Self::EmptyTransaction => "transaction.empty",
            Self::InvalidDestination { .. } => "transaction.invalid_destination",
        })
    }
}
