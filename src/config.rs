//! Service configuration from environment variables and an optional TOML file.
//!
//! Precedence is defaults, then the TOML file named by `QUERY_CONTROL_CONFIG`,
//! then `QUERY_CONTROL_*` environment variables. Invalid values fall back to
//! the previous layer and are reported in [`ControlConfig::warnings`].
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `QUERY_CONTROL_STORE` | memory | Checkpoint backend (`memory` or `file`) |
//! | `QUERY_CONTROL_STORE_DIR` | ./checkpoints | Root directory of the file backend |
//! | `QUERY_CONTROL_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `QUERY_CONTROL_LOG_LEVEL` | info | Tracing filter directive |
//! | `QUERY_CONTROL_LOG_FORMAT` | json | Log format (`json` or `pretty`) |
//! | `QUERY_CONTROL_CONFIG` | unset | Optional TOML file with the same keys |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::telemetry::{LogConfig, LogFormat};

pub const ENV_STORE: &str = "QUERY_CONTROL_STORE";
pub const ENV_STORE_DIR: &str = "QUERY_CONTROL_STORE_DIR";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "QUERY_CONTROL_SHUTDOWN_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "QUERY_CONTROL_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "QUERY_CONTROL_LOG_FORMAT";
pub const ENV_CONFIG_FILE: &str = "QUERY_CONTROL_CONFIG";

const DEFAULT_STORE_DIR: &str = "./checkpoints";
const DEFAULT_SHUTDOWN_SECS: u64 = 30;

/// Checkpoint store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_STORE,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Keys accepted in the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    store: Option<StoreBackend>,
    store_dir: Option<PathBuf>,
    shutdown_timeout_secs: Option<u64>,
    log_level: Option<String>,
    log_format: Option<String>,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub store: StoreBackend,
    pub store_dir: PathBuf,
    pub shutdown_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Problems found while loading; each one fell back to a default.
    pub warnings: Vec<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_SECS),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            warnings: Vec::new(),
        }
    }
}

/// Flat summary of every effective value, used by `config show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub store: String,
    pub store_dir: String,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl ControlConfig {
    /// Parse a TOML document over the defaults. Unlike [`load`], invalid
    /// values are errors.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(s)?;
        let mut cfg = Self::default();
        cfg.apply_file(file)?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(store) = file.store {
            self.store = store;
        }
        if let Some(dir) = file.store_dir {
            self.store_dir = dir;
        }
        if let Some(secs) = file.shutdown_timeout_secs {
            self.shutdown_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        if let Some(format) = file.log_format {
            self.log_format = format.parse().map_err(|_| ConfigError::InvalidValue {
                key: "log_format",
                value: format,
            })?;
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(value) = env_var(ENV_STORE) {
            match value.parse() {
                Ok(store) => self.store = store,
                Err(e) => self.warnings.push(format!("{}; using {}", e, self.store)),
            }
        }
        if let Some(value) = env_var(ENV_STORE_DIR) {
            self.store_dir = PathBuf::from(value);
        }
        if let Some(value) = env_var(ENV_SHUTDOWN_TIMEOUT) {
            match value.parse::<u64>() {
                Ok(secs) => self.shutdown_timeout = Duration::from_secs(secs.max(1)),
                Err(_) => self.warnings.push(format!(
                    "Invalid value for {}: {:?}; using {}",
                    ENV_SHUTDOWN_TIMEOUT,
                    value,
                    self.shutdown_timeout.as_secs()
                )),
            }
        }
        if let Some(value) = env_var(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = env_var(ENV_LOG_FORMAT) {
            match value.parse() {
                Ok(format) => self.log_format = format,
                Err(_) => self.warnings.push(format!(
                    "Invalid value for {}: {:?}; using {}",
                    ENV_LOG_FORMAT,
                    value,
                    self.log_format.as_str()
                )),
            }
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            output_path: None,
        }
    }

    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            store: self.store.as_str().to_string(),
            store_dir: self.store_dir.display().to_string(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.as_str().to_string(),
        }
    }
}

/// Non-empty environment variable, trimmed.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load configuration from the optional TOML file and the environment.
///
/// Never fails: a missing or invalid file is recorded as a warning and the
/// defaults are used in its place.
pub fn load() -> ControlConfig {
    let mut cfg = match env_var(ENV_CONFIG_FILE) {
        Some(path) => match ControlConfig::from_toml_file(Path::new(&path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                let mut cfg = ControlConfig::default();
                cfg.warnings.push(format!("{}; using defaults", e));
                cfg
            }
        },
        None => ControlConfig::default(),
    };
    cfg.apply_env();
    cfg
}

// Serialize env-mutating tests to avoid cross-test pollution.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
