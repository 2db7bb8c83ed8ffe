//! Checkpoint storage error types.

use thiserror::Error;

/// Errors raised by a [`CheckpointStore`](super::CheckpointStore) backend.
///
/// Everything except `NotFound` is a storage fault and surfaces to service
/// callers as a retryable `StorageUnavailable`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checksum mismatch for checkpoint {checkpoint_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        checkpoint_id: String,
        expected: String,
        actual: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
