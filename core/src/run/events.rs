use chrono::{DateTime, Utc};

use crate::error::TaskOutcome;

use super::{RunId, TriggerKind};

/// Lifecycle events broadcast by the engine.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        pipeline: String,
        trigger: TriggerKind,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        run_id: RunId,
        task: String,
        command: String,
        args: Vec<String>,
    },
    TaskFinished {
        run_id: RunId,
        task: String,
        outcome: TaskOutcome,
        duration_ms: u64,
    },
    PolicyDenied {
        run_id: RunId,
        task: String,
        command: String,
        reason: String,
    },
    RunFinished {
        run_id: RunId,
        pipeline: String,
        outcome: TaskOutcome,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::TaskStarted { run_id, .. }
            | Self::TaskFinished { run_id, .. }
            | Self::PolicyDenied { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}
