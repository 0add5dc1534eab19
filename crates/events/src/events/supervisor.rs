use serde::{Deserialize, Serialize};

/// Lifecycle of supervised native commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Spawned {
        command: String,
        pid: Option<u32>,
    },

    StatusLine {
        package: String,
        percent: f64,
        description: String,
    },

    PackageError {
        package: String,
        message: String,
    },

    ConffilePrompt {
        current: String,
        new: String,
    },

    MalformedStatus {
        line: String,
    },

    InactivityTimeout {
        timeout_secs: u64,
    },

    Exited {
        command: String,
        code: Option<i32>,
    },

    RecoveryStarted {
        command: String,
    },

    RecoveryFailed {
        command: String,
        message: String,
    },
}
