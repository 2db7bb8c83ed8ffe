//! Checkpoint storage abstraction.

use async_trait::async_trait;

use super::{Checkpoint, CheckpointDraft, CheckpointId, StorageError};
use crate::query::QueryId;

/// Durable, queryable storage of checkpoints, indexed by query id.
///
/// Implementations must be `Send + Sync`; the service shares one store across
/// all queries and calls it concurrently for different ids. Calls for the
/// same id are already serialized by the service.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a new checkpoint. The store assigns a fresh id and a timestamp
    /// strictly greater than any earlier checkpoint of the same query.
    async fn create_checkpoint(&self, draft: CheckpointDraft) -> Result<Checkpoint, StorageError>;

    /// All checkpoints of `query_id`, in no particular order. Unknown queries
    /// yield an empty list.
    async fn get_checkpoints(&self, query_id: &QueryId) -> Result<Vec<Checkpoint>, StorageError>;

    /// A single checkpoint, or `StorageError::NotFound`.
    async fn get_checkpoint(
        &self,
        query_id: &QueryId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Checkpoint, StorageError>;

    /// Delete all but the `keep_latest` newest checkpoints of `query_id`.
    /// Returns how many were removed.
    async fn prune(&self, query_id: &QueryId, keep_latest: usize) -> Result<usize, StorageError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
