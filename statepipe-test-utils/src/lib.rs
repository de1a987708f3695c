//! Statepipe Test Utilities
//!
//! Shared test infrastructure for the statepipe workspace:
//! - Proptest generators for documents, paths, edits, and filters
//! - Fixtures modelled on the invoice states the pipeline edits
//! - Assertions over `StateResult`

// Re-export core types for convenience
pub use statepipe_core::{
    Document, DocumentColumn, DocumentShape, FieldEdit, FieldPath, FieldValue, IdentityFilter,
    NotFoundError, RawRow, Slot, StateError, StateId, StateRecord, StateResult, StorageError,
    Timestamp, ValidationError,
};
pub use statepipe_storage::InMemoryRepository;

use serde_json::{json, Value};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for statepipe types.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_state_id() -> impl Strategy<Value = StateId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Generate an arbitrary JSON value, nested up to four levels.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1.0e6f64..1.0e6).prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z_]{1,8}", inner), 0..5)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect())),
            ]
        })
    }

    /// Generate a JSON object document.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::vec(("[a-z_]{1,8}", arb_json()), 0..6)
            .prop_map(|entries| entries.into_iter().collect())
    }

    /// Generate a field path of one to four segments.
    pub fn arb_field_path() -> impl Strategy<Value = FieldPath> {
        prop::collection::vec("[a-z_]{1,8}", 1..5).prop_filter_map("valid path", |segments| {
            FieldPath::new(segments).ok()
        })
    }

    /// Generate a field value with confidence in [0, 1].
    pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        ("[A-Za-z ]{0,16}", 0.0f64..=1.0).prop_filter_map("finite confidence", |(value, confidence)| {
            FieldValue::new(value, confidence).ok()
        })
    }

    /// Generate a field edit.
    pub fn arb_field_edit() -> impl Strategy<Value = FieldEdit> {
        (arb_field_path(), arb_field_value()).prop_map(|(path, value)| FieldEdit::new(path, value))
    }

    /// Generate an identity filter over a small value alphabet so that
    /// generated documents match it with useful probability.
    pub fn arb_identity_filter() -> impl Strategy<Value = IdentityFilter> {
        let value = || proptest::option::of("[ab]{1,2}");
        (value(), value(), value(), value(), value()).prop_map(
            |(trace_id, doc_id, workflow_id, tenant_id, step_id)| {
                let mut filter = IdentityFilter::new();
                if let Some(v) = trace_id {
                    filter = filter.with_trace_id(v);
                }
                if let Some(v) = doc_id {
                    filter = filter.with_doc_id(v);
                }
                if let Some(v) = workflow_id {
                    filter = filter.with_workflow_id(v);
                }
                if let Some(v) = tenant_id {
                    filter = filter.with_tenant_id(v);
                }
                if let Some(v) = step_id {
                    filter = filter.with_step_id(v);
                }
                filter
            },
        )
    }

    /// Generate a document whose identifier keys draw from the same
    /// alphabet as [`arb_identity_filter`].
    pub fn arb_identified_document() -> impl Strategy<Value = Document> {
        let id = || {
            prop_oneof![
                Just(None),
                "[ab]{1,2}".prop_map(|s| Some(Value::String(s))),
                any::<i64>().prop_map(|n| Some(Value::from(n))),
            ]
        };
        (id(), id(), id(), id(), id(), arb_document()).prop_map(
            |(trace_id, doc_id, workflow_id, tenant_id, step_id, mut document)| {
                for (key, value) in [
                    ("trace_id", trace_id),
                    ("doc_id", doc_id),
                    ("workflow_id", workflow_id),
                    ("tenant_id", tenant_id),
                    ("step_id", step_id),
                ] {
                    match value {
                        Some(value) => {
                            document.insert(key.to_string(), value);
                        }
                        None => {
                            document.remove(key);
                        }
                    }
                }
                document
            },
        )
    }

    /// Generate a persisted record with optional timestamps.
    pub fn arb_state_record() -> impl Strategy<Value = StateRecord> {
        (
            arb_state_id(),
            arb_identified_document(),
            proptest::option::of(arb_timestamp()),
            proptest::option::of(arb_timestamp()),
        )
            .prop_map(|(id, document, created_at, updated_at)| {
                StateRecord::new(id, document).with_timestamps(created_at, updated_at)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    pub const TRACE_ID: &str = "fabpqz0l-7g2h-11ee-be56-0242ac120002";
    pub const DOC_ID: &str = "afsds-dsafs-fsdf-fs";
    pub const WORKFLOW_ID: &str = "afsds-dsafs-fsdf-fs_wf_sdsf";
    pub const TENANT_ID: &str = "tt";
    pub const STEP_ID: &str = "S01";

    /// A flattened invoice state with an empty shipper.
    pub fn invoice_document() -> Document {
        let value = json!({
            "trace_id": TRACE_ID,
            "doc_id": DOC_ID,
            "workflow_id": WORKFLOW_ID,
            "tenant_id": TENANT_ID,
            "step_id": STEP_ID,
            "canonical_schema": {
                "schema_name": "invoice_canonical_schema",
                "schema_version": "1.0",
                "document_type": "invoice",
                "parties": {
                    "shipper": {},
                    "consignee": {
                        "name": {"value": "XYZ Retail", "confidence": 0.91}
                    },
                    "bill_to": {}
                },
                "totals": {
                    "amount": {"value": "1520.00", "confidence": 0.88}
                }
            }
        });
        match value {
            Value::Object(document) => document,
            _ => Document::new(),
        }
    }

    /// Filter selecting [`invoice_document`] by every identifier.
    pub fn invoice_filter() -> IdentityFilter {
        IdentityFilter::new()
            .with_trace_id(TRACE_ID)
            .with_doc_id(DOC_ID)
            .with_workflow_id(WORKFLOW_ID)
            .with_tenant_id(TENANT_ID)
            .with_step_id(STEP_ID)
    }

    pub fn shipper_name_path() -> FieldPath {
        FieldPath::new(["canonical_schema", "parties", "shipper", "name"])
            .unwrap_or_else(|e| panic!("fixture path is valid: {e}"))
    }

    /// Set the shipper name to "ABC Logistics" at confidence 0.98.
    pub fn shipper_edit() -> FieldEdit {
        let value = FieldValue::new("ABC Logistics", 0.98)
            .unwrap_or_else(|e| panic!("fixture value is valid: {e}"));
        FieldEdit::new(shipper_name_path(), value)
    }

    /// A fresh invoice record with a new v7 id.
    pub fn invoice_record() -> StateRecord {
        StateRecord::new(Uuid::now_v7(), invoice_document())
    }

    /// Raw row as a database extraction returns it.
    pub fn invoice_raw_row(state_id: StateId) -> RawRow {
        let mut row = RawRow::new();
        row.insert("state_id".to_string(), Value::String(state_id.to_string()));
        row.insert("extracted_data".to_string(), Value::Object(invoice_document()));
        row.insert(
            "created_at".to_string(),
            Value::String("2025-03-04T10:00:00.000000+00:00".to_string()),
        );
        row.insert("updated_at".to_string(), Value::Null);
        row
    }

    /// In-memory repository holding one invoice row; returns its id.
    pub fn seeded_repository() -> (InMemoryRepository, StateId) {
        let repository = InMemoryRepository::new();
        let state_id = Uuid::now_v7();
        repository
            .insert_raw_row(invoice_raw_row(state_id))
            .unwrap_or_else(|e| panic!("fixture row is valid: {e}"));
        (repository, state_id)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over statepipe results.

    use super::*;

    /// Assert that a StateResult is a NotFound error for `state_id`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &StateResult<T>, state_id: StateId) {
        match result {
            Err(StateError::NotFound(NotFoundError { state_id: id })) => {
                assert_eq!(*id, state_id, "Wrong state id in NotFound error");
            }
            other => panic!("Expected NotFound for {}, got: {:?}", state_id, other),
        }
    }

    /// Assert that a StateResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &StateResult<T>) {
        match result {
            Err(StateError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a StateResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &StateResult<T>) {
        match result {
            Err(StateError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that `path` in `document` holds exactly `value`.
    #[track_caller]
    pub fn assert_field(document: &Document, path: &FieldPath, value: &FieldValue) {
        assert_eq!(
            statepipe_core::read_path(document, path).cloned(),
            Slot::Present(value.to_json()),
            "Field {} does not hold {:?}",
            path,
            value
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================
