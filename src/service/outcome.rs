//! Results of successful service operations.

use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::query::QueryState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseOutcome {
    pub checkpoint_id: CheckpointId,
    pub state: QueryState,
    pub pause_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeOutcome {
    pub resumed_from: CheckpointId,
    pub state: QueryState,
    pub resume_time_ms: f64,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateOutcome {
    pub final_state: QueryState,
    pub terminate_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub removed: usize,
    pub retained: usize,
}
