//! Model assignment for controlled queries.
//!
//! Holds the fixed model catalog and the hot-swap validator.

mod swap;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

pub use swap::{ModelSwitch, ModelSwitcher};

/// Model variants a query may be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Sonnet,
    Opus,
    Haiku,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::Sonnet, Model::Opus, Model::Haiku];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
            Self::Haiku => "haiku",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ControlError::InvalidModel(s.to_string()))
    }
}

/// Current model assignment of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: Model,
}

impl ModelConfig {
    pub fn new(model: Model) -> Self {
        Self { model }
    }
}

impl From<Model> for ModelConfig {
    fn from(model: Model) -> Self {
        Self::new(model)
    }
}
