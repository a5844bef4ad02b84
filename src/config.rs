//! Global configuration parsing and validation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// One step of a simulated operation served by the bundled HTTP server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SimulatedStepConfig {
    /// Identifier, unique within its operation; also the counter key prefix.
    pub id: String,
    /// Message shown to clients while the step runs.
    pub message: String,
    /// Duration guess used until the step has history.
    pub guessed_time_ms: u64,
    /// How long the simulated step actually sleeps.
    #[serde(default)]
    pub duration_ms: u64,
    /// Whether the step fails after sleeping.
    #[serde(default)]
    pub fail: bool,
}

/// A named, ordered list of simulated steps.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OperationConfig {
    /// Steps in execution order.
    pub steps: Vec<SimulatedStepConfig>,
}

fn default_http_port() -> u16 {
    3000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("progress-stream.db")
}

fn default_poll_interval_ms() -> u64 {
    200
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the event-stream server.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// `SQLite` file holding step counters.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Interval at which consumers poll their tracker.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Simulated operations exposed under `/operations/{name}`.
    #[serde(default)]
    pub operations: HashMap<String, OperationConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            poll_interval_ms: default_poll_interval_ms(),
            operations: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Interval between consumer tracker polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        for (name, operation) in &self.operations {
            if operation.steps.is_empty() {
                return Err(AppError::Config(format!(
                    "operation '{name}' must declare at least one step"
                )));
            }

            let mut seen = HashSet::new();
            for step in &operation.steps {
                if step.id.trim().is_empty() {
                    return Err(AppError::Config(format!(
                        "operation '{name}' has a step with an empty id"
                    )));
                }
                if !seen.insert(step.id.as_str()) {
                    return Err(AppError::Config(format!(
                        "operation '{name}' declares step '{}' twice",
                        step.id
                    )));
                }
            }
        }

        Ok(())
    }
}
