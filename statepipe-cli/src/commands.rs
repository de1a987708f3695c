//! Subcommand implementations over any state repository.

use statepipe_core::{FieldEdit, FieldPath, FieldValue, IdentityFilter, NotFoundError, StateId};
use statepipe_storage::{EditPipeline, PersistMode, StateRepository};

use crate::error::CliResult;
use crate::output::{EditOutcome, RecordDetail, RecordSummary};

/// Arguments of the `edit` subcommand after parsing.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub path: String,
    pub value: String,
    pub confidence: f64,
    pub filter: IdentityFilter,
    pub limit: usize,
    pub mode: PersistMode,
    pub verify: bool,
}

impl EditRequest {
    pub fn field_edit(&self) -> CliResult<FieldEdit> {
        let path: FieldPath = self.path.parse()?;
        let value = FieldValue::new(self.value.clone(), self.confidence)?;
        Ok(FieldEdit::new(path, value))
    }
}

pub async fn extract<R: StateRepository>(
    pipeline: &EditPipeline<R>,
    filter: &IdentityFilter,
    limit: usize,
) -> CliResult<Vec<RecordSummary>> {
    let records = pipeline.extract(filter, limit).await?;
    Ok(records.iter().map(RecordSummary::from).collect())
}

pub async fn edit<R: StateRepository>(
    pipeline: &EditPipeline<R>,
    request: &EditRequest,
) -> CliResult<Vec<EditOutcome>> {
    let edit = request.field_edit()?;
    let payloads = pipeline
        .run(&request.filter, request.limit, &edit, request.mode)
        .await?;

    let mut outcomes = Vec::with_capacity(payloads.len());
    for payload in &payloads {
        let verified = if request.verify {
            let state_id = payload.state_id.parse::<StateId>().map_err(|e| {
                statepipe_core::ValidationError::InvalidStateId {
                    value: payload.state_id.clone(),
                    reason: e.to_string(),
                }
            })?;
            Some(pipeline.verify(state_id, &edit.path).await?)
        } else {
            None
        };
        outcomes.push(EditOutcome::new(payload, verified));
    }

    tracing::info!(edited = outcomes.len(), path = %edit.path, "Edit finished");
    Ok(outcomes)
}

pub async fn show<R: StateRepository>(
    pipeline: &EditPipeline<R>,
    state_id: StateId,
) -> CliResult<RecordDetail> {
    let record = pipeline
        .repository()
        .get(state_id)
        .await?
        .ok_or(statepipe_core::StateError::from(NotFoundError { state_id }))?;
    Ok(RecordDetail::from(&record))
}
