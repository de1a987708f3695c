//! Error types for statepipe operations

use thiserror::Error;
use uuid::Uuid;

/// Malformed stored document text.
///
/// Never surfaced by the merger: normalization logs it and substitutes an
/// empty document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed document text at line {line}, column {column}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

impl From<&serde_json::Error> for ParseError {
    fn from(err: &serde_json::Error) -> Self {
        Self {
            line: err.line(),
            column: err.column(),
            reason: err.to_string(),
        }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Record has no state_id; it cannot be persisted")]
    MissingStateId,

    #[error("Invalid state_id {value:?}: {reason}")]
    InvalidStateId { value: String, reason: String },

    #[error("Invalid timestamp for {field}: {value:?}")]
    InvalidTimestamp { field: String, value: String },

    #[error("Field path is empty")]
    EmptyPath,

    #[error("Field path {path:?} has an empty segment at position {position}")]
    EmptySegment { path: String, position: usize },

    #[error("Confidence must be a finite number, got {value}")]
    InvalidConfidence { value: String },
}

/// The addressed record does not exist in storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("State {state_id} not found")]
pub struct NotFoundError {
    pub state_id: Uuid,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend failed during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Connection pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for all statepipe errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for statepipe operations.
pub type StateResult<T> = Result<T, StateError>;

// =============================================================================
// TESTS
// =============================================================================
