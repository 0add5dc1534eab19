//! Supervised child process error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SupervisorError {
    #[error("failed to launch {command}: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("no activity for {timeout_secs}s, child process was interrupted")]
    Killed { timeout_secs: u64, output: String },

    #[error("{package}: {message}")]
    PackageFailed {
        package: String,
        message: String,
        output: String,
    },

    #[error("{command} exited with status {code:?}")]
    ExitFailure {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("malformed status line: {line:?}")]
    MalformedStatus { line: String },

    #[error("status channel error: {message}")]
    Io { message: String },
}

impl SupervisorError {
    /// Captured terminal output of the child, if the failure carries any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Killed { output, .. }
            | Self::PackageFailed { output, .. }
            | Self::ExitFailure { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl UserFacingError for SupervisorError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::Killed { .. } => Cow::Borrowed(
                "Transaction was cancelled since the installation of a package hung. \
                 This can be caused by maintainer scripts which require input on the terminal.",
            ),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SpawnFailed { .. } => {
                Some("Check that the native package manager is installed and executable.")
            }
            Self::Killed { .. } | Self::PackageFailed { .. } | Self::ExitFailure { .. } => {
                Some("Run `dpkg --configure -a` (or the equivalent) manually to inspect the failure.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::SpawnFailed { .. } => "supervisor.spawn_failed",
            Self::Killed { .. } => "supervisor.killed",
            Self::PackageFailed { .. } => "supervisor.package_failed",
            Self::ExitFailure { .. } => "supervisor.exit_failure",
            Self::MalformedStatus { .. } => "supervisor.malformed_status",
            Self::Io { .. } => "supervisor.io",
        })
    }
}
