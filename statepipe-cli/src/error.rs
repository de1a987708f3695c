//! CLI error type

use statepipe_core::{ConfigError, StateError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<ValidationError> for CliError {
    fn from(err: ValidationError) -> Self {
        CliError::State(err.into())
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::State(err.into())
    }
}

/// Result type alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
