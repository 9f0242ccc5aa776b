//! Harness error types

use std::time::Duration;

use shared::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration could not be loaded: {0}")]
    ConfigLoadFailure(#[from] ConfigError),

    #[error("Failed to launch '{command}': {source}")]
    LaunchFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {elapsed:?} ({attempts} attempts) waiting for {what}; last observed: {}", last_observed.as_deref().unwrap_or("<nothing>"))]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: u32,
        last_observed: Option<String>,
    },

    #[error("Assertion violated after {at:?} (attempt {attempts}) for {what}: observed {observed}")]
    AssertionViolation {
        what: String,
        at: Duration,
        attempts: u32,
        observed: String,
    },

    #[error("Command '{command}' exited with {code}: {output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Provisioning failed: {}", failures.join("; "))]
    ProvisioningFailed { failures: Vec<String> },

    #[error("{plugin} plugin must be installed")]
    MissingPlugin { plugin: String },

    #[error("Unknown scenario '{name}'. Available: {available}")]
    UnknownScenario { name: String, available: String },

    #[error("{} scenario(s) failed: {}", failures.len(), failures.join("; "))]
    ScenariosFailed { failures: Vec<String> },

    #[error("Invalid poll policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn timeout(what: impl Into<String>, elapsed: Duration, attempts: u32, last_observed: Option<String>) -> Self {
        HarnessError::Timeout {
            what: what.into(),
            elapsed,
            attempts,
            last_observed,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
