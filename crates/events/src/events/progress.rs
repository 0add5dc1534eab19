use crate::PhaseRange;
use serde::{Deserialize, Serialize};

/// Phase bookkeeping of the progress engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A phase plan was laid out over the remaining range
    Planned { phases: Vec<(String, PhaseRange)> },

    PhaseStarted { phase: String },

    /// A step beyond the announced number of steps was reported
    StepOverrun { phase: String, step: usize },
}
