//! Error types for the query control core.
//!
//! Every failure is returned to the caller as a typed result. Nothing here is
//! retried internally; `is_retryable` tells the collaborator layer which
//! failures are worth another attempt.

use thiserror::Error;

use crate::checkpoint::{CheckpointId, StorageError};
use crate::query::{QueryId, QueryState};

/// Errors returned by [`QueryControlService`](crate::service::QueryControlService)
/// operations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Query not found: {0}")]
    QueryNotFound(QueryId),

    #[error("Query already registered: {0}")]
    DuplicateQuery(QueryId),

    #[error("Cannot {operation} query {query_id} while {current}")]
    InvalidState {
        query_id: QueryId,
        current: QueryState,
        operation: &'static str,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid permission mode: {0}")]
    InvalidMode(String),

    #[error("Checkpoint not found for query {query_id}{}", fmt_checkpoint(.checkpoint_id))]
    CheckpointNotFound {
        query_id: QueryId,
        checkpoint_id: Option<CheckpointId>,
    },

    #[error("Checkpoint storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Query control service is shutting down")]
    ShuttingDown,
}

fn fmt_checkpoint(id: &Option<CheckpointId>) -> String {
    match id {
        Some(id) => format!(": {}", id),
        None => String::new(),
    }
}

/// Coarse classification used by request handlers to pick a response kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Internal,
}

impl ErrorClass {
    /// Conventional numeric status for transports that want one.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }
}

impl ControlError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::QueryNotFound(_) => ErrorClass::NotFound,
            Self::InvalidState { .. } | Self::InvalidModel(_) | Self::InvalidMode(_) => {
                ErrorClass::BadRequest
            }
            Self::DuplicateQuery(_)
            | Self::CheckpointNotFound { .. }
            | Self::StorageUnavailable(_)
            | Self::ShuttingDown => ErrorClass::Internal,
        }
    }

    /// Returns true if the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// State observed when the operation was rejected, if the error carries one.
    pub fn current_state(&self) -> Option<QueryState> {
        match self {
            Self::InvalidState { current, .. } => Some(*current),
            _ => None,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueryNotFound(_) => "query_not_found",
            Self::DuplicateQuery(_) => "duplicate_query",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidModel(_) => "invalid_model",
            Self::InvalidMode(_) => "invalid_mode",
            Self::CheckpointNotFound { .. } => "checkpoint_not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ShuttingDown => "shutting_down",
        }
    }

    pub(crate) fn from_storage(
        err: StorageError,
        query_id: &QueryId,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Self {
        match err {
            StorageError::NotFound(_) => Self::CheckpointNotFound {
                query_id: query_id.clone(),
                checkpoint_id: checkpoint_id.cloned(),
            },
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}
