//! In-memory state repository.
//!
//! Keeps raw rows rather than records so reads go through the same
//! ingestion path as a database extraction, malformed documents included.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use statepipe_core::{
    parse_timestamp, refreshed_updated_at, DocumentColumn, DocumentShape, IdentityFilter,
    NotFoundError, PersistedPayload, RawRow, StateId, StateRecord, StateResult, StorageError,
    Timestamp, ValidationError,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::repository::StateRepository;

/// Repository over a map of raw rows keyed by state id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    rows: Arc<RwLock<BTreeMap<StateId, RawRow>>>,
    shape: DocumentShape,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records are ingested with this shape.
    pub fn with_shape(shape: DocumentShape) -> Self {
        Self {
            shape,
            ..Self::default()
        }
    }

    /// Seed a raw row as an extraction source would return it.
    pub fn insert_raw_row(&self, row: RawRow) -> StateResult<StateId> {
        let state_id = match row.get("state_id") {
            Some(Value::String(text)) => {
                Uuid::parse_str(text).map_err(|e| ValidationError::InvalidStateId {
                    value: text.clone(),
                    reason: e.to_string(),
                })?
            }
            _ => return Err(ValidationError::MissingStateId.into()),
        };
        self.write()?.insert(state_id, row);
        Ok(state_id)
    }

    /// Seed a record.
    pub fn insert(&self, record: &StateRecord) -> StateResult<StateId> {
        let state_id = record.state_id().ok_or(ValidationError::MissingStateId)?;
        self.write()?.insert(state_id, record.to_raw_row());
        Ok(state_id)
    }

    pub fn len(&self) -> StateResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> StateResult<std::sync::RwLockReadGuard<'_, BTreeMap<StateId, RawRow>>> {
        Ok(self.rows.read().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn write(&self) -> StateResult<std::sync::RwLockWriteGuard<'_, BTreeMap<StateId, RawRow>>> {
        Ok(self.rows.write().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn ingest(&self, row: &RawRow) -> StateResult<StateRecord> {
        Ok(StateRecord::from_raw_row(row, self.shape)?)
    }
}

fn stored_timestamp(row: &RawRow, field: &str) -> StateResult<Option<Timestamp>> {
    Ok(parse_timestamp(field, row.get(field))?)
}

#[async_trait]
impl StateRepository for InMemoryRepository {
    async fn fetch(&self, filter: &IdentityFilter, limit: usize) -> StateResult<Vec<StateRecord>> {
        let rows = self.read()?;
        let mut records = Vec::new();
        for row in rows.values() {
            if records.len() >= limit {
                break;
            }
            let record = self.ingest(row)?;
            if filter.matches(record.document()) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn get(&self, state_id: StateId) -> StateResult<Option<StateRecord>> {
        let rows = self.read()?;
        rows.get(&state_id).map(|row| self.ingest(row)).transpose()
    }

    async fn update_document(&self, payload: &PersistedPayload) -> StateResult<()> {
        let state_id =
            Uuid::parse_str(&payload.state_id).map_err(|e| ValidationError::InvalidStateId {
                value: payload.state_id.clone(),
                reason: e.to_string(),
            })?;
        let document: Value =
            serde_json::from_str(&payload.document).map_err(|e| StorageError::Backend {
                operation: "update_document".to_string(),
                reason: format!("document is not valid JSON: {e}"),
            })?;

        let mut rows = self.write()?;
        let row = rows.get_mut(&state_id).ok_or(NotFoundError { state_id })?;

        let column = DocumentColumn::holding(row);
        let updated_at = refreshed_updated_at(stored_timestamp(row, "updated_at")?, Utc::now());
        row.insert(column.as_str().to_string(), document);
        row.insert("updated_at".to_string(), Value::String(updated_at.to_rfc3339()));
        Ok(())
    }

    async fn upsert(&self, record: &StateRecord) -> StateResult<()> {
        let state_id = record.state_id().ok_or(ValidationError::MissingStateId)?;
        let now = Utc::now();

        let mut rows = self.write()?;
        let created_at = match rows.get(&state_id) {
            Some(existing) => stored_timestamp(existing, "created_at")?,
            None => None,
        }
        .or(record.created_at())
        .unwrap_or(now);
        let previous = match rows.get(&state_id) {
            Some(existing) => stored_timestamp(existing, "updated_at")?,
            None => None,
        };
        let updated_at = refreshed_updated_at(previous, record.updated_at().unwrap_or(now));

        let stored = record
            .clone()
            .with_timestamps(Some(created_at), Some(updated_at));
        rows.insert(state_id, stored.to_raw_row());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
