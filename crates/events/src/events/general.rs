use serde::{Deserialize, Serialize};

/// Engine notices that belong to no single transaction notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Something went wrong that did not decide the outcome
    Warning {
        message: String,
        context: Option<String>,
    },
}

impl GeneralEvent {
    pub fn warning(message: impl Into<String>, context: Option<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context,
        }
    }
}
