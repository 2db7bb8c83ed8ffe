//! Request and response envelopes for the JSON-lines driver.
//!
//! One request per line in, one response per line out. Field names are
//! camelCase and timestamps are ISO-8601 strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkpoint::{Checkpoint, CheckpointId, CheckpointPage};
use crate::error::ControlError;
use crate::models::{Model, ModelSwitch};
use crate::permissions::{ModeSwitch, PermissionMode};
use crate::query::{QueryId, QueryState, QuerySummary};
use crate::service::{PauseOutcome, PruneOutcome, ResumeOutcome, TerminateOutcome};
use crate::telemetry::MetricsSnapshot;

/// Max accepted request line, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid request: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Request too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid execution context: {0}")]
    InvalidContext(String),
}

/// Every operation the driver accepts, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    #[serde(rename_all = "camelCase")]
    Register {
        query_id: String,
        model: String,
        #[serde(default)]
        permission_mode: Option<String>,
    },

    /// `executionContext` is any JSON value; it is stored as its serialized
    /// bytes.
    #[serde(rename_all = "camelCase")]
    Pause {
        query_id: String,
        #[serde(default)]
        execution_context: Option<serde_json::Value>,
    },

    #[serde(rename_all = "camelCase")]
    Resume {
        query_id: String,
        #[serde(default)]
        checkpoint_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SwitchModel { query_id: String, model: String },

    #[serde(rename_all = "camelCase")]
    SwitchPermissionMode { query_id: String, mode: String },

    #[serde(rename_all = "camelCase")]
    Terminate { query_id: String },

    List,

    #[serde(rename_all = "camelCase")]
    Get { query_id: String },

    #[serde(rename_all = "camelCase")]
    Checkpoints {
        query_id: String,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        offset: usize,
    },

    #[serde(rename_all = "camelCase")]
    Prune { query_id: String, keep_latest: usize },

    Metrics,
}

impl ControlRequest {
    pub fn query_id(&self) -> Option<&str> {
        match self {
            Self::Register { query_id, .. }
            | Self::Pause { query_id, .. }
            | Self::Resume { query_id, .. }
            | Self::SwitchModel { query_id, .. }
            | Self::SwitchPermissionMode { query_id, .. }
            | Self::Terminate { query_id }
            | Self::Get { query_id }
            | Self::Checkpoints { query_id, .. }
            | Self::Prune { query_id, .. } => Some(query_id),
            Self::List | Self::Metrics => None,
        }
    }
}

/// Query summary as shown to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryView {
    pub query_id: QueryId,
    pub state: QueryState,
    pub model: Model,
    pub permission_mode: PermissionMode,
    pub created_at: String,
    pub last_checkpoint_id: Option<CheckpointId>,
}

impl From<QuerySummary> for QueryView {
    fn from(summary: QuerySummary) -> Self {
        Self {
            created_at: summary.created_at_iso(),
            query_id: summary.query_id,
            state: summary.state,
            model: summary.model_config.model,
            permission_mode: summary.permission_mode,
            last_checkpoint_id: summary.last_checkpoint_id,
        }
    }
}

/// Checkpoint as shown to callers. The execution context is decoded as JSON
/// when possible; otherwise only its size is reported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointView {
    pub id: CheckpointId,
    pub query_id: QueryId,
    pub state: QueryState,
    pub timestamp: String,
    pub model: Model,
    pub permission_mode: PermissionMode,
    pub execution_context: Option<serde_json::Value>,
    pub execution_context_bytes: usize,
}

impl From<&Checkpoint> for CheckpointView {
    fn from(c: &Checkpoint) -> Self {
        let execution_context = if c.execution_context.is_empty() {
            None
        } else {
            c.execution_context.to_json().ok()
        };
        Self {
            id: c.id.clone(),
            query_id: c.query_id.clone(),
            state: c.state,
            timestamp: c.timestamp_iso(),
            model: c.model_config.model,
            permission_mode: c.permission_mode,
            execution_context,
            execution_context_bytes: c.execution_context.len(),
        }
    }
}

/// Operation-specific response fields, flattened next to `success`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Query {
        query: QueryView,
    },
    Queries {
        queries: Vec<QueryView>,
    },
    #[serde(rename_all = "camelCase")]
    Pause {
        checkpoint_id: CheckpointId,
        state: QueryState,
        pause_time_ms: f64,
    },
    #[serde(rename_all = "camelCase")]
    Resume {
        resumed_from: CheckpointId,
        state: QueryState,
        resume_time_ms: f64,
        checkpoint: CheckpointView,
    },
    ModelSwitch(ModelSwitch),
    ModeSwitch(ModeSwitch),
    Terminate(TerminateOutcome),
    #[serde(rename_all = "camelCase")]
    Checkpoints {
        checkpoints: Vec<CheckpointView>,
        total: usize,
        offset: usize,
        has_more: bool,
    },
    Prune(PruneOutcome),
    Metrics {
        metrics: MetricsSnapshot,
    },
}

impl From<PauseOutcome> for ResponseData {
    fn from(o: PauseOutcome) -> Self {
        Self::Pause {
            checkpoint_id: o.checkpoint_id,
            state: o.state,
            pause_time_ms: o.pause_time_ms,
        }
    }
}

impl From<ResumeOutcome> for ResponseData {
    fn from(o: ResumeOutcome) -> Self {
        Self::Resume {
            checkpoint: CheckpointView::from(&o.checkpoint),
            resumed_from: o.resumed_from,
            state: o.state,
            resume_time_ms: o.resume_time_ms,
        }
    }
}

impl From<CheckpointPage> for ResponseData {
    fn from(page: CheckpointPage) -> Self {
        Self::Checkpoints {
            checkpoints: page.items.iter().map(CheckpointView::from).collect(),
            total: page.total,
            offset: page.offset,
            has_more: page.has_more,
        }
    }
}

/// One response line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Query state after the failed call, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<QueryState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(flatten)]
    pub data: Option<ResponseData>,
}

impl ControlResponse {
    pub fn success(data: impl Into<ResponseData>) -> Self {
        Self {
            success: true,
            code: None,
            error: None,
            error_kind: None,
            state: None,
            retryable: None,
            data: Some(data.into()),
        }
    }

    pub fn failure(error: &ControlError, state: Option<QueryState>) -> Self {
        Self {
            success: false,
            code: Some(error.class().status_code()),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            state: error.current_state().or(state),
            retryable: Some(error.is_retryable()),
            data: None,
        }
    }

    pub fn bad_request(error: &ProtocolError) -> Self {
        Self {
            success: false,
            code: Some(400),
            error: Some(error.to_string()),
            error_kind: Some("bad_request"),
            state: None,
            retryable: Some(false),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl From<ModelSwitch> for ResponseData {
    fn from(s: ModelSwitch) -> Self {
        Self::ModelSwitch(s)
    }
}

impl From<ModeSwitch> for ResponseData {
    fn from(s: ModeSwitch) -> Self {
        Self::ModeSwitch(s)
    }
}

impl From<TerminateOutcome> for ResponseData {
    fn from(o: TerminateOutcome) -> Self {
        Self::Terminate(o)
    }
}

impl From<PruneOutcome> for ResponseData {
    fn from(o: PruneOutcome) -> Self {
        Self::Prune(o)
    }
}

/// Decode one request line.
pub fn decode_request(line: &str) -> Result<ControlRequest, ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::MessageTooLarge {
            size: line.len(),
            max: MAX_LINE_BYTES,
        });
    }
    Ok(serde_json::from_str(line)?)
}

/// Encode one response line, without the trailing newline.
pub fn encode_response(response: &ControlResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"code":500,"error":"Failed to encode response: {}"}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_tagged_requests() {
        let req = decode_request(r#"{"op":"register","queryId":"q1","model":"sonnet"}"#).unwrap();
        assert_eq!(
            req,
            ControlRequest::Register {
                query_id: "q1".into(),
                model: "sonnet".into(),
                permission_mode: None,
            }
        );

        let req = decode_request(r#"{"op":"switch_permission_mode","queryId":"q1","mode":"plan"}"#)
            .unwrap();
        assert_eq!(req.query_id(), Some("q1"));

        let req = decode_request(r#"{"op":"checkpoints","queryId":"q1","limit":5}"#).unwrap();
        assert!(matches!(
            req,
            ControlRequest::Checkpoints { limit: Some(5), offset: 0, .. }
        ));

        assert_eq!(decode_request(r#"{"op":"list"}"#).unwrap(), ControlRequest::List);
    }

    #[test]
    fn test_decode_rejects_unknown_op() {
        assert!(matches!(
            decode_request(r#"{"op":"explode","queryId":"q1"}"#),
            Err(ProtocolError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_line() {
        let line = "x".repeat(MAX_LINE_BYTES + 1);
        assert!(matches!(
            decode_request(&line),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_failure_carries_code_and_state() {
        let err = ControlError::InvalidState {
            query_id: QueryId::from("q1"),
            current: QueryState::Terminated,
            operation: "pause",
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_response(&ControlResponse::failure(&err, None))).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["code"], json!(400));
        assert_eq!(value["state"], json!("terminated"));
        assert_eq!(value["errorKind"], json!("invalid_state"));
    }

    #[test]
    fn test_success_flattens_data() {
        let response = ControlResponse::success(PruneOutcome { removed: 2, retained: 1 });
        let value: serde_json::Value = serde_json::from_str(&encode_response(&response)).unwrap();
        assert_eq!(value, json!({"success": true, "removed": 2, "retained": 1}));
    }
}
