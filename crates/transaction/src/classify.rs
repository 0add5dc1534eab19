//! Maps failures onto the error taxonomy and recovery actions

use pkgd_errors::{Error, ErrorKind, NetworkError, SupervisorError, UserFacingError};
use pkgd_types::TransactionOutcome;

/// What to do before a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Reopen the cache to drop in-memory marks
    ReopenCache,
    /// Run the native repair pass on the package database
    RepairDatabase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub recovery: Recovery,
    /// Whether the failure becomes the transaction's outcome
    pub surface: bool,
}

pub struct ErrorClassifier;

impl ErrorClassifier {
    #[must_use]
    pub fn classify(error: &Error) -> Classification {
        let kind = error.kind();
        let (recovery, surface) = match error {
            Error::Cancelled | Error::Network(NetworkError::Cancelled) => (Recovery::ReopenCache, false),
            Error::Supervisor(SupervisorError::MalformedStatus { .. }) => (Recovery::None, false),
            Error::Supervisor(
                SupervisorError::Killed { .. }
                | SupervisorError::PackageFailed { .. }
                | SupervisorError::ExitFailure { .. },
            ) => (Recovery::RepairDatabase, true),
            _ if kind == ErrorKind::DownloadFailed => (Recovery::ReopenCache, true),
            _ => (Recovery::None, true),
        };
        Classification {
            kind,
            recovery,
            surface,
        }
    }

    /// Terminal outcome for a failure, detailed with the user-facing message
    #[must_use]
    pub fn outcome(error: &Error) -> TransactionOutcome {
        if error.is_cancelled() {
            return TransactionOutcome::Cancelled;
        }
        let detail = error.user_message().into_owned();
        match error.kind() {
            ErrorKind::Killed => TransactionOutcome::Killed { detail },
            kind => TransactionOutcome::failed(kind, detail),
        }
    }
}
