//! Checkpoint capture and storage.
//!
//! A checkpoint is an immutable snapshot of a query's state, model,
//! permission mode and opaque execution context. Stores own persisted
//! checkpoints and index them by query id.

mod context;
mod error;
mod file;
mod memory;
mod store;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ModelConfig;
use crate::permissions::PermissionMode;
use crate::query::{QueryId, QueryState};

pub use context::ExecutionContext;
pub use error::StorageError;
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use store::CheckpointStore;

/// Unique checkpoint identifier, generated at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CheckpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Immutable point-in-time snapshot of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub query_id: QueryId,
    pub state: QueryState,
    /// Milliseconds since the Unix epoch; strictly increasing per query.
    pub timestamp: u64,
    pub model_config: ModelConfig,
    pub permission_mode: PermissionMode,
    pub execution_context: ExecutionContext,
}

impl Checkpoint {
    /// `timestamp` rendered as an ISO-8601 / RFC 3339 string.
    pub fn timestamp_iso(&self) -> String {
        crate::query::millis_to_iso(self.timestamp)
    }
}

/// Everything a store needs to capture a checkpoint. The store assigns the
/// id and timestamp.
#[derive(Debug, Clone)]
pub struct CheckpointDraft {
    pub query_id: QueryId,
    pub state: QueryState,
    pub model_config: ModelConfig,
    pub permission_mode: PermissionMode,
    pub execution_context: ExecutionContext,
}

impl CheckpointDraft {
    pub(crate) fn seal(self, id: CheckpointId, timestamp: u64) -> Checkpoint {
        Checkpoint {
            id,
            query_id: self.query_id,
            state: self.state,
            timestamp,
            model_config: self.model_config,
            permission_mode: self.permission_mode,
            execution_context: self.execution_context,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Next capture timestamp for a query whose newest checkpoint is `last`.
///
/// Never repeats or goes backwards, even if the wall clock does.
pub fn next_timestamp(last: Option<u64>) -> u64 {
    let now = now_ms();
    match last {
        Some(last) => now.max(last.saturating_add(1)),
        None => now,
    }
}

/// Checkpoint with the greatest timestamp.
pub fn latest(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
    checkpoints.iter().max_by_key(|c| c.timestamp)
}

/// Sort newest first. Ties (only possible across queries) break on id.
pub fn sort_newest_first(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
}

/// One page of checkpoints, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPage {
    pub items: Vec<Checkpoint>,
    pub total: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Sort `checkpoints` newest first and slice out `[offset, offset + limit)`.
/// A missing `limit` returns everything after `offset`.
pub fn paginate(mut checkpoints: Vec<Checkpoint>, limit: Option<usize>, offset: usize) -> CheckpointPage {
    sort_newest_first(&mut checkpoints);
    let total = checkpoints.len();
    let start = offset.min(total);
    let end = match limit {
        Some(limit) => start.saturating_add(limit).min(total),
        None => total,
    };
    let items = checkpoints.drain(start..end).collect();
    CheckpointPage {
        items,
        total,
        offset,
        has_more: end < total,
    }
}
