//! Mapping of driver and pool errors into storage errors

use deadpool_postgres::{CreatePoolError, PoolError};
use statepipe_core::{StateError, StorageError};
use thiserror::Error;

/// Failures raised by the Postgres driver or its pool.
#[derive(Debug, Error)]
pub enum PgError {
    #[error("{operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("{operation} returned an unexpected row: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    CreatePool(#[from] CreatePoolError),
}

impl PgError {
    /// Adapter for `map_err` on driver calls.
    pub fn query(operation: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Self {
        move |source| PgError::Query { operation, source }
    }
}

impl From<PgError> for StorageError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Query { operation, source } => {
                // Log the driver detail; the surfaced reason stays short
                tracing::error!(operation, error = ?source, "Database error");
                let reason = source
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| source.to_string());
                StorageError::Backend {
                    operation: operation.to_string(),
                    reason,
                }
            }
            PgError::Decode { operation, reason } => {
                tracing::error!(operation, %reason, "Unexpected row from database");
                StorageError::Backend {
                    operation: operation.to_string(),
                    reason,
                }
            }
            PgError::Pool(err) => {
                tracing::error!(error = ?err, "Connection pool error");
                match err {
                    PoolError::Timeout(_) => StorageError::PoolUnavailable {
                        reason: "timed out waiting for a connection".to_string(),
                    },
                    PoolError::Closed => StorageError::PoolUnavailable {
                        reason: "connection pool is closed".to_string(),
                    },
                    other => StorageError::PoolUnavailable {
                        reason: other.to_string(),
                    },
                }
            }
            PgError::CreatePool(err) => {
                tracing::error!(error = ?err, "Failed to create connection pool");
                StorageError::PoolUnavailable {
                    reason: format!("failed to create pool: {err}"),
                }
            }
        }
    }
}

impl From<PgError> for StateError {
    fn from(err: PgError) -> Self {
        StateError::Storage(err.into())
    }
}
