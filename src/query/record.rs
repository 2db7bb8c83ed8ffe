//! The registry's record of a single controlled query.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::state::QueryState;
use crate::checkpoint::CheckpointId;
use crate::models::ModelConfig;
use crate::permissions::PermissionMode;

/// Unique, immutable identifier of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for QueryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Live record for one query. Only the service mutates it.
#[derive(Debug, Clone)]
pub struct Query {
    pub query_id: QueryId,
    pub state: QueryState,
    pub model_config: ModelConfig,
    pub permission_mode: PermissionMode,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub last_checkpoint_id: Option<CheckpointId>,
}

impl Query {
    pub fn new(
        query_id: QueryId,
        model_config: ModelConfig,
        permission_mode: PermissionMode,
        created_at: u64,
    ) -> Self {
        Self {
            query_id,
            state: QueryState::Running,
            model_config,
            permission_mode,
            created_at,
            last_checkpoint_id: None,
        }
    }

    pub fn summary(&self) -> QuerySummary {
        QuerySummary {
            query_id: self.query_id.clone(),
            state: self.state,
            model_config: self.model_config.clone(),
            permission_mode: self.permission_mode,
            created_at: self.created_at,
            last_checkpoint_id: self.last_checkpoint_id.clone(),
        }
    }
}

/// Read-only snapshot of a [`Query`] handed out to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    pub query_id: QueryId,
    pub state: QueryState,
    pub model_config: ModelConfig,
    pub permission_mode: PermissionMode,
    pub created_at: u64,
    pub last_checkpoint_id: Option<CheckpointId>,
}

impl QuerySummary {
    /// `created_at` rendered as an ISO-8601 / RFC 3339 string.
    pub fn created_at_iso(&self) -> String {
        millis_to_iso(self.created_at)
    }
}

pub(crate) fn millis_to_iso(ms: u64) -> String {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
