//! Identity filters over document keys.
//!
//! Selects rows whose document carries given identifier values at its top
//! level. The same filter is evaluated in memory ([`IdentityFilter::matches`])
//! and rendered to SQL by the Postgres repository ([`IdentityFilter::clauses`]).

use crate::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier keys that can appear in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKey {
    TraceId,
    DocId,
    WorkflowId,
    TenantId,
    StepId,
}

impl IdentityKey {
    pub const ALL: [IdentityKey; 5] = [
        IdentityKey::TraceId,
        IdentityKey::DocId,
        IdentityKey::WorkflowId,
        IdentityKey::TenantId,
        IdentityKey::StepId,
    ];

    /// Document key this identifier is stored under.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKey::TraceId => "trace_id",
            IdentityKey::DocId => "doc_id",
            IdentityKey::WorkflowId => "workflow_id",
            IdentityKey::TenantId => "tenant_id",
            IdentityKey::StepId => "step_id",
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunction of `document.key == value` conditions. Empty matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl IdentityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, value: impl Into<String>) -> Self {
        self.trace_id = Some(value.into());
        self
    }

    pub fn with_doc_id(mut self, value: impl Into<String>) -> Self {
        self.doc_id = Some(value.into());
        self
    }

    pub fn with_workflow_id(mut self, value: impl Into<String>) -> Self {
        self.workflow_id = Some(value.into());
        self
    }

    pub fn with_tenant_id(mut self, value: impl Into<String>) -> Self {
        self.tenant_id = Some(value.into());
        self
    }

    pub fn with_step_id(mut self, value: impl Into<String>) -> Self {
        self.step_id = Some(value.into());
        self
    }

    pub fn get(&self, key: IdentityKey) -> Option<&str> {
        match key {
            IdentityKey::TraceId => self.trace_id.as_deref(),
            IdentityKey::DocId => self.doc_id.as_deref(),
            IdentityKey::WorkflowId => self.workflow_id.as_deref(),
            IdentityKey::TenantId => self.tenant_id.as_deref(),
            IdentityKey::StepId => self.step_id.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses().is_empty()
    }

    /// Set conditions in [`IdentityKey::ALL`] order.
    pub fn clauses(&self) -> Vec<(IdentityKey, &str)> {
        IdentityKey::ALL
            .into_iter()
            .filter_map(|key| self.get(key).map(|value| (key, value)))
            .collect()
    }

    /// Whether `document` satisfies every set condition.
    ///
    /// Only top-level string values match; the SQL rendering compares
    /// against `to_jsonb(value::text)` for the same reason.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses().into_iter().all(|(key, expected)| {
            matches!(document.get(key.as_str()), Some(Value::String(actual)) if actual == expected)
        })
    }
}
