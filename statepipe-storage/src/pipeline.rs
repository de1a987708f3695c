//! Fetch → merge → persist → verify.
//!
//! Each record is merged independently; the pipeline keeps no state
//! between records beyond the repository handle.

use serde_json::Value;
use statepipe_core::{
    merge_edit, FieldEdit, FieldPath, IdentityFilter, NotFoundError, PersistedPayload, Slot,
    StateId, StateRecord, StateResult,
};

use crate::repository::{PersistMode, StateRepository};

/// Drives field edits against a repository.
#[derive(Debug, Clone)]
pub struct EditPipeline<R> {
    repository: R,
}

impl<R: StateRepository> EditPipeline<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Fetch up to `limit` records matching `filter`.
    pub async fn extract(&self, filter: &IdentityFilter, limit: usize) -> StateResult<Vec<StateRecord>> {
        let records = self.repository.fetch(filter, limit).await?;
        tracing::info!(count = records.len(), limit, "Extracted state records");
        Ok(records)
    }

    /// Merge `edit` into one record and persist it.
    ///
    /// On success `record` reflects what was written.
    pub async fn apply(
        &self,
        record: &mut StateRecord,
        edit: &FieldEdit,
        mode: PersistMode,
    ) -> StateResult<PersistedPayload> {
        let payload = merge_edit(record, edit)?;

        match mode {
            PersistMode::TargetedUpdate => self.repository.update_document(&payload).await?,
            PersistMode::Upsert => self.repository.upsert(record).await?,
        }

        tracing::info!(
            state_id = %payload.state_id,
            path = %edit.path,
            %mode,
            "Persisted field edit"
        );
        Ok(payload)
    }

    /// Extract matching records and apply `edit` to each of them.
    ///
    /// Stops at the first record that fails; earlier records stay written.
    pub async fn run(
        &self,
        filter: &IdentityFilter,
        limit: usize,
        edit: &FieldEdit,
        mode: PersistMode,
    ) -> StateResult<Vec<PersistedPayload>> {
        let records = self.extract(filter, limit).await?;
        let mut payloads = Vec::with_capacity(records.len());
        for mut record in records {
            payloads.push(self.apply(&mut record, edit, mode).await?);
        }
        Ok(payloads)
    }

    /// Re-read a record and report the value at `path`.
    pub async fn verify(&self, state_id: StateId, path: &FieldPath) -> StateResult<Slot<Value>> {
        let record = self
            .repository
            .get(state_id)
            .await?
            .ok_or(NotFoundError { state_id })?;
        let slot = record.read(path).cloned();
        tracing::debug!(
            %state_id,
            path = %path,
            present = slot.is_present(),
            "Verified record"
        );
        Ok(slot)
    }
}
