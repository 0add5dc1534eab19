use serde::{Deserialize, Serialize};

pub mod general;
pub mod progress;
pub mod supervisor;
pub mod transaction;

pub use general::*;
pub use progress::*;
pub use supervisor::*;
pub use transaction::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Engine warnings outside the transaction notifications
    General(GeneralEvent),

    /// Client-facing transaction notifications
    Transaction(TransactionEvent),

    /// Progress engine bookkeeping
    Progress(ProgressEvent),

    /// Supervised child process lifecycle
    Supervisor(SupervisorEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::Transaction(TransactionEvent::ErrorCode { .. })
            | Self::Supervisor(
                SupervisorEvent::InactivityTimeout { .. }
                | SupervisorEvent::RecoveryFailed { .. }
                | SupervisorEvent::PackageError { .. },
            ) => Level::ERROR,

            Self::Transaction(TransactionEvent::Finished { outcome, .. })
                if !outcome.is_success() =>
            {
                Level::WARN
            }

            Self::General(GeneralEvent::Warning { .. })
            | Self::Progress(ProgressEvent::StepOverrun { .. })
            | Self::Supervisor(
                SupervisorEvent::MalformedStatus { .. } | SupervisorEvent::ConffilePrompt { .. },
            ) => Level::WARN,

            Self::Progress(_)
            | Self::Supervisor(SupervisorEvent::StatusLine { .. })
            | Self::Transaction(
                TransactionEvent::PercentageChanged { .. }
                | TransactionEvent::SubPercentageChanged { .. }
                | TransactionEvent::AllowCancel { .. },
            ) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "pkgd::events::general",
            Self::Transaction(_) => "pkgd::events::transaction",
            Self::Progress(_) => "pkgd::events::progress",
            Self::Supervisor(_) => "pkgd::events::supervisor",
        }
    }
}
