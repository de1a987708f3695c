//! Rendering of command results as text or JSON.

use serde::Serialize;
use serde_json::Value;
use statepipe_core::{PersistedPayload, Slot, StateRecord, Timestamp};
use statepipe_pg::ColumnInfo;

use crate::error::CliResult;
use crate::OutputFormat;

/// One extracted record, identifiers only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub state_id: Option<String>,
    pub column: &'static str,
    pub trace_id: Value,
    pub doc_id: Value,
    pub workflow_id: Value,
    pub tenant_id: Value,
    pub step_id: Value,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl From<&StateRecord> for RecordSummary {
    fn from(record: &StateRecord) -> Self {
        let fields = record.fields();
        Self {
            state_id: record.state_id().map(|id| id.to_string()),
            column: record.column().as_str(),
            trace_id: fields.trace_id.to_json(),
            doc_id: fields.doc_id.to_json(),
            workflow_id: fields.workflow_id.to_json(),
            tenant_id: fields.tenant_id.to_json(),
            step_id: fields.step_id.to_json(),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
        }
    }
}

/// A record with its canonical schema, for `show`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDetail {
    #[serde(flatten)]
    pub summary: RecordSummary,
    pub canonical_schema: Value,
}

impl From<&StateRecord> for RecordDetail {
    fn from(record: &StateRecord) -> Self {
        Self {
            summary: RecordSummary::from(record),
            canonical_schema: record.fields().canonical_schema.to_json(),
        }
    }
}

/// Outcome of editing one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOutcome {
    pub state_id: String,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<Value>,
}

impl EditOutcome {
    pub fn new(payload: &PersistedPayload, verified: Option<Slot<Value>>) -> Self {
        Self {
            state_id: payload.state_id.clone(),
            updated_at: payload.updated_at,
            verified: verified.map(|slot| slot.to_json()),
        }
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_timestamp(value: Option<Timestamp>) -> String {
    value.map(|ts| ts.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

pub fn render_records(records: &[RecordSummary], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => json(records),
        OutputFormat::Text => {
            if records.is_empty() {
                return Ok("No matching records".to_string());
            }
            let lines: Vec<String> = records
                .iter()
                .map(|r| {
                    format!(
                        "{}  trace_id={} doc_id={} workflow_id={} tenant_id={} step_id={} updated_at={}",
                        r.state_id.as_deref().unwrap_or("-"),
                        text_value(&r.trace_id),
                        text_value(&r.doc_id),
                        text_value(&r.workflow_id),
                        text_value(&r.tenant_id),
                        text_value(&r.step_id),
                        text_timestamp(r.updated_at),
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

pub fn render_detail(detail: &RecordDetail, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => json(detail),
        OutputFormat::Text => {
            let s = &detail.summary;
            Ok(format!(
                "state_id:    {}\ncolumn:      {}\ntrace_id:    {}\ndoc_id:      {}\nworkflow_id: {}\ntenant_id:   {}\nstep_id:     {}\ncreated_at:  {}\nupdated_at:  {}\ncanonical_schema:\n{}",
                s.state_id.as_deref().unwrap_or("-"),
                s.column,
                text_value(&s.trace_id),
                text_value(&s.doc_id),
                text_value(&s.workflow_id),
                text_value(&s.tenant_id),
                text_value(&s.step_id),
                text_timestamp(s.created_at),
                text_timestamp(s.updated_at),
                json(&detail.canonical_schema)?,
            ))
        }
    }
}

pub fn render_edits(outcomes: &[EditOutcome], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => json(outcomes),
        OutputFormat::Text => {
            if outcomes.is_empty() {
                return Ok("No matching records; nothing edited".to_string());
            }
            let lines: Vec<String> = outcomes
                .iter()
                .map(|o| match &o.verified {
                    Some(value) => format!(
                        "{}  updated_at={}  verified={}",
                        o.state_id,
                        o.updated_at.to_rfc3339(),
                        value
                    ),
                    None => format!("{}  updated_at={}", o.state_id, o.updated_at.to_rfc3339()),
                })
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

pub fn render_columns(columns: &[ColumnInfo], prefix: &str, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => json(columns),
        OutputFormat::Text => {
            if columns.is_empty() {
                return Ok(format!("No columns starting with '{prefix}'"));
            }
            let lines: Vec<String> = columns
                .iter()
                .map(|c| {
                    format!(
                        "{}  {}  {}",
                        c.name,
                        c.data_type,
                        if c.nullable { "NULL" } else { "NOT NULL" }
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
    }
}
