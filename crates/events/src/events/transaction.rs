use pkgd_errors::ErrorKind;
use pkgd_types::{
    MessageKind, PackageInfo, PackageRef, Percentage, RestartKind, Role, TransactionOutcome,
    TransactionStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notifications a client sees for one transaction, in production order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionEvent {
    Started {
        id: Uuid,
        role: Role,
    },

    StatusChanged {
        status: TransactionStatus,
    },

    /// Global progress; never decreases within a transaction
    PercentageChanged {
        percentage: Percentage,
    },

    /// Progress of the item currently being processed
    SubPercentageChanged {
        percentage: Percentage,
    },

    AllowCancel {
        allowed: bool,
    },

    Package {
        info: PackageInfo,
        package: PackageRef,
        summary: Option<String>,
    },

    ErrorCode {
        kind: ErrorKind,
        details: String,
    },

    Message {
        kind: MessageKind,
        details: String,
    },

    RequireRestart {
        kind: RestartKind,
        package: Option<PackageRef>,
    },

    /// Terminal notification, emitted exactly once
    Finished {
        outcome: TransactionOutcome,
        runtime_ms: u64,
    },
}
