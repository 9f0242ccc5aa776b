//! Shared error types for the drain acceptance harness

use thiserror::Error;

/// Failure to build a [`TestConfig`](crate::config::TestConfig) from the environment.
///
/// `Missing` means required settings are absent (the suite may be skipped);
/// `Invalid` means a value is present but malformed (always fatal).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", fields.join(", "))]
    Missing { fields: Vec<String> },

    #[error("Invalid configuration: {field} = {value} ({reason})")]
    Invalid {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::Missing { .. })
    }
}

pub type SharedResult<T> = Result<T, ConfigError>;
