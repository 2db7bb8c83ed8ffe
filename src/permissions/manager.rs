//! Permission-mode transitions.
//!
//! Every mode may move to every other mode. The manager only rejects unknown
//! values and dead queries, and measures how long the switch took.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PermissionMode;
use crate::error::ControlError;
use crate::query::Query;

/// Result of a successful permission-mode switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeSwitch {
    pub previous_mode: PermissionMode,
    pub new_mode: PermissionMode,
    pub switch_time_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionModeManager;

impl PermissionModeManager {
    pub fn new() -> Self {
        Self
    }

    pub fn switch_mode(&self, query: &mut Query, requested: &str) -> Result<ModeSwitch, ControlError> {
        let start = Instant::now();
        let new_mode: PermissionMode = requested.parse()?;

        if !query.state.accepts_mutation() {
            return Err(ControlError::InvalidState {
                query_id: query.query_id.clone(),
                current: query.state,
                operation: "switch permission mode on",
            });
        }

        let previous_mode = query.permission_mode;
        query.permission_mode = new_mode;

        debug!(
            query_id = %query.query_id,
            from = %previous_mode,
            to = %new_mode,
            "permission mode switched"
        );

        Ok(ModeSwitch {
            previous_mode,
            new_mode,
            switch_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Model, ModelConfig};
    use crate::query::{QueryId, QueryState};

    fn query() -> Query {
        Query::new(
            QueryId::from("q1"),
            ModelConfig::new(Model::Sonnet),
            PermissionMode::Default,
            0,
        )
    }

    #[test]
    fn test_every_pair_is_allowed() {
        let manager = PermissionModeManager::new();
        for from in PermissionMode::ALL {
            for to in PermissionMode::ALL {
                let mut q = query();
                q.permission_mode = from;
                let switch = manager.switch_mode(&mut q, to.as_str()).unwrap();
                assert_eq!(switch.previous_mode, from);
                assert_eq!(switch.new_mode, to);
                assert_eq!(q.permission_mode, to);
            }
        }
    }

    #[test]
    fn test_unknown_mode_leaves_query_untouched() {
        let mut q = query();
        let err = PermissionModeManager::new().switch_mode(&mut q, "root").unwrap_err();
        assert!(matches!(err, ControlError::InvalidMode(ref m) if m == "root"));
        assert_eq!(q.permission_mode, PermissionMode::Default);
    }

    #[test]
    fn test_terminated_query_rejected() {
        let mut q = query();
        q.state = QueryState::Terminated;
        let err = PermissionModeManager::new().switch_mode(&mut q, "plan").unwrap_err();
        assert_eq!(err.current_state(), Some(QueryState::Terminated));
        assert_eq!(q.permission_mode, PermissionMode::Default);
    }
}
