//! Terminal transaction results

use pkgd_errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitted exactly once at the end of every transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Success,
    Failed { kind: ErrorKind, detail: String },
    Cancelled,
    Killed { detail: String },
}

impl TransactionOutcome {
    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Error kind carried by the outcome, `Killed` included
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Killed { .. } => Some(ErrorKind::Killed),
            Self::Success | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed { kind, detail } => write!(f, "failed ({kind}): {detail}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Killed { detail } => write!(f, "killed: {detail}"),
        }
    }
}
