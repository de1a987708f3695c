//! Async repository trait for the states table.

use async_trait::async_trait;
use statepipe_core::{IdentityFilter, PersistedPayload, StateId, StateRecord, StateResult};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How an edited record is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Set the document and `updated_at = now()` on an existing row.
    /// Zero rows affected is a not-found error.
    #[default]
    TargetedUpdate,
    /// Write the whole record, inserting it when absent.
    Upsert,
}

impl fmt::Display for PersistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistMode::TargetedUpdate => f.write_str("update"),
            PersistMode::Upsert => f.write_str("upsert"),
        }
    }
}

impl FromStr for PersistMode {
    type Err = statepipe_core::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "update" => Ok(PersistMode::TargetedUpdate),
            "upsert" => Ok(PersistMode::Upsert),
            other => Err(statepipe_core::ConfigError::InvalidValue {
                field: "persist_mode".to_string(),
                value: other.to_string(),
                reason: "expected 'update' or 'upsert'".to_string(),
            }),
        }
    }
}

/// Storage for state records.
///
/// Implementations hand records back already ingested: document
/// normalized, holder column and shape resolved.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Fetch up to `limit` records whose document matches `filter`.
    async fn fetch(&self, filter: &IdentityFilter, limit: usize) -> StateResult<Vec<StateRecord>>;

    /// Get one record by id.
    async fn get(&self, state_id: StateId) -> StateResult<Option<StateRecord>>;

    /// Targeted update of the document of an existing row; `updated_at` is
    /// set by the store. Returns `NotFoundError` when no row has the id.
    async fn update_document(&self, payload: &PersistedPayload) -> StateResult<()>;

    /// Insert-or-update the whole record keyed by its id.
    async fn upsert(&self, record: &StateRecord) -> StateResult<()>;
}

#[async_trait]
impl<T: StateRepository + ?Sized> StateRepository for Arc<T> {
    async fn fetch(&self, filter: &IdentityFilter, limit: usize) -> StateResult<Vec<StateRecord>> {
        (**self).fetch(filter, limit).await
    }

    async fn get(&self, state_id: StateId) -> StateResult<Option<StateRecord>> {
        (**self).get(state_id).await
    }

    async fn update_document(&self, payload: &PersistedPayload) -> StateResult<()> {
        (**self).update_document(payload).await
    }

    async fn upsert(&self, record: &StateRecord) -> StateResult<()> {
        (**self).upsert(record).await
    }
}
