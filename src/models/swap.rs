//! Model hot-swap for live queries.
//!
//! A swap never suspends the query. It only replaces the assignment that the
//! execution engine picks up on its next step.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Model, ModelConfig};
use crate::error::ControlError;
use crate::query::Query;

/// Result of a successful model swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSwitch {
    pub previous_model: Model,
    pub new_model: Model,
    pub switch_time_ms: f64,
}

/// Validates and applies model swaps.
#[derive(Debug, Clone, Default)]
pub struct ModelSwitcher;

impl ModelSwitcher {
    pub fn new() -> Self {
        Self
    }

    /// Parse `requested` as one of [`Model::ALL`].
    pub fn resolve(&self, requested: &str) -> Result<Model, ControlError> {
        requested.parse()
    }

    /// Swap the model assignment on `query`.
    ///
    /// Running and Paused queries both accept a swap; a Terminated query
    /// rejects it and is left untouched.
    pub fn switch_model(&self, query: &mut Query, requested: &str) -> Result<ModelSwitch, ControlError> {
        let start = Instant::now();
        let new_model = self.resolve(requested)?;

        if !query.state.accepts_mutation() {
            return Err(ControlError::InvalidState {
                query_id: query.query_id.clone(),
                current: query.state,
                operation: "switch model on",
            });
        }

        let previous_model = query.model_config.model;
        query.model_config = ModelConfig::new(new_model);

        debug!(
            query_id = %query.query_id,
            from = %previous_model,
            to = %new_model,
            "model assignment swapped"
        );

        Ok(ModelSwitch {
            previous_model,
            new_model,
            switch_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
