//! Metric names and facade helpers.
//!
//! Without an installed recorder these calls are no-ops.

use crate::error::ControlError;

pub const OPERATIONS_TOTAL: &str = "query_control_operations_total";
pub const OPERATION_LATENCY_MS: &str = "query_control_operation_latency_ms";
pub const ACTIVE_QUERIES: &str = "query_control_active_queries";

/// Mutating service operations that are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Pause,
    Resume,
    SwitchModel,
    SwitchPermissionMode,
    Terminate,
    Prune,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::SwitchModel => "switch_model",
            Self::SwitchPermissionMode => "switch_permission_mode",
            Self::Terminate => "terminate",
            Self::Prune => "prune",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    Rejected,
    Failed,
}

impl Outcome {
    /// Client-side rejections are `Rejected`; storage faults and shutdown are
    /// `Failed`.
    pub fn of<T>(result: &Result<T, ControlError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(ControlError::StorageUnavailable(_) | ControlError::ShuttingDown) => Self::Failed,
            Err(_) => Self::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

pub fn record_operation(operation: Operation, outcome: Outcome, latency_ms: f64) {
    ::metrics::counter!(
        OPERATIONS_TOTAL,
        "operation" => operation.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    ::metrics::histogram!(OPERATION_LATENCY_MS, "operation" => operation.as_str()).record(latency_ms);
}

pub fn record_active_queries(count: usize) {
    ::metrics::gauge!(ACTIVE_QUERIES).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryId;

    #[test]
    fn test_outcome_classification() {
        let ok: Result<(), ControlError> = Ok(());
        assert_eq!(Outcome::of(&ok), Outcome::Ok);

        let rejected: Result<(), _> = Err(ControlError::QueryNotFound(QueryId::from("q")));
        assert_eq!(Outcome::of(&rejected), Outcome::Rejected);

        let failed: Result<(), _> = Err(ControlError::StorageUnavailable("io".into()));
        assert_eq!(Outcome::of(&failed), Outcome::Failed);
    }

    #[test]
    fn test_facade_without_recorder_is_noop() {
        record_operation(Operation::Pause, Outcome::Ok, 1.5);
        record_active_queries(3);
    }
}
