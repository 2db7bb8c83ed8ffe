//! In-process checkpoint store.
//!
//! Uses DashMap so captures for different queries never contend on a global
//! lock.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    next_timestamp, sort_newest_first, Checkpoint, CheckpointDraft, CheckpointId, CheckpointStore,
    StorageError,
};
use crate::query::QueryId;

pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<QueryId, QueryCheckpoints>,
    available: AtomicBool,
}

#[derive(Default)]
struct QueryCheckpoints {
    list: Vec<Checkpoint>,
    /// Newest timestamp ever issued for the query. Survives pruning.
    high_water: Option<u64>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a backend outage. While unavailable every call fails with
    /// `StorageError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Total checkpoints held across all queries.
    pub fn len(&self) -> usize {
        self.checkpoints.iter().map(|e| e.value().list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("in-memory store marked unavailable".into()))
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create_checkpoint(&self, draft: CheckpointDraft) -> Result<Checkpoint, StorageError> {
        self.check_available()?;

        let mut entry = self.checkpoints.entry(draft.query_id.clone()).or_default();
        let checkpoint = draft.seal(CheckpointId::generate(), next_timestamp(entry.high_water));
        entry.high_water = Some(checkpoint.timestamp);
        entry.list.push(checkpoint.clone());

        Ok(checkpoint)
    }

    async fn get_checkpoints(&self, query_id: &QueryId) -> Result<Vec<Checkpoint>, StorageError> {
        self.check_available()?;
        Ok(self
            .checkpoints
            .get(query_id)
            .map(|entry| entry.list.clone())
            .unwrap_or_default())
    }

    async fn get_checkpoint(
        &self,
        query_id: &QueryId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Checkpoint, StorageError> {
        self.check_available()?;
        self.checkpoints
            .get(query_id)
            .and_then(|entry| entry.list.iter().find(|c| &c.id == checkpoint_id).cloned())
            .ok_or_else(|| StorageError::not_found(checkpoint_id.as_str()))
    }

    async fn prune(&self, query_id: &QueryId, keep_latest: usize) -> Result<usize, StorageError> {
        self.check_available()?;
        let Some(mut entry) = self.checkpoints.get_mut(query_id) else {
            return Ok(0);
        };
        let list = &mut entry.list;
        if list.len() <= keep_latest {
            return Ok(0);
        }
        sort_newest_first(list);
        let removed = list.len() - keep_latest;
        list.truncate(keep_latest);
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{latest, ExecutionContext};
    use crate::models::{Model, ModelConfig};
    use crate::permissions::PermissionMode;
    use crate::query::QueryState;

    fn draft(query: &str, model: Model) -> CheckpointDraft {
        CheckpointDraft {
            query_id: QueryId::from(query),
            state: QueryState::Running,
            model_config: ModelConfig::new(model),
            permission_mode: PermissionMode::Default,
            execution_context: ExecutionContext::new(b"ctx".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = InMemoryCheckpointStore::new();
        let mut prev = 0;
        for _ in 0..50 {
            let c = store.create_checkpoint(draft("q1", Model::Sonnet)).await.unwrap();
            assert!(c.timestamp > prev);
            prev = c.timestamp;
        }
        assert_eq!(store.len(), 50);
    }

    #[tokio::test]
    async fn test_unknown_query_is_empty_not_error() {
        let store = InMemoryCheckpointStore::new();
        let list = store.get_checkpoints(&QueryId::from("nope")).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_get_checkpoint_scoped_by_query() {
        let store = InMemoryCheckpointStore::new();
        let c = store.create_checkpoint(draft("q1", Model::Opus)).await.unwrap();

        let found = store.get_checkpoint(&QueryId::from("q1"), &c.id).await.unwrap();
        assert_eq!(found, c);

        let err = store.get_checkpoint(&QueryId::from("q2"), &c.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let store = InMemoryCheckpointStore::new();
        let q = QueryId::from("q1");
        for model in [Model::Sonnet, Model::Opus, Model::Haiku] {
            store.create_checkpoint(draft("q1", model)).await.unwrap();
        }

        assert_eq!(store.prune(&q, 1).await.unwrap(), 2);
        let left = store.get_checkpoints(&q).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(latest(&left).unwrap().model_config.model, Model::Haiku);

        assert_eq!(store.prune(&q, 5).await.unwrap(), 0);
        assert_eq!(store.prune(&QueryId::from("none"), 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timestamps_keep_increasing_after_full_prune() {
        let store = InMemoryCheckpointStore::new();
        let q = QueryId::from("q1");
        let mut timestamps = Vec::new();
        for _ in 0..5 {
            let c = store.create_checkpoint(draft("q1", Model::Sonnet)).await.unwrap();
            timestamps.push(c.timestamp);
        }
        let newest = timestamps.into_iter().max().unwrap();
        assert_eq!(store.prune(&q, 0).await.unwrap(), 5);
        assert!(store.get_checkpoints(&q).await.unwrap().is_empty());

        let next = store.create_checkpoint(draft("q1", Model::Opus)).await.unwrap();
        assert!(next.timestamp > newest);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryCheckpointStore::new();
        store.set_available(false);
        let err = store.create_checkpoint(draft("q1", Model::Sonnet)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(store.get_checkpoints(&QueryId::from("q1")).await.is_err());

        store.set_available(true);
        assert!(store.create_checkpoint(draft("q1", Model::Sonnet)).await.is_ok());
    }
}
