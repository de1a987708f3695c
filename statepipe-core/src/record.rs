//! State records and row ingestion.

use crate::document::{apply_edit_in_place, normalize_value, read_path, FieldEdit, FieldPath};
use crate::error::ValidationError;
use crate::{Document, DocumentColumn, DocumentShape, RawRow, Slot, StateId, Timestamp};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Key of the canonical schema inside a document.
pub const CANONICAL_SCHEMA_KEY: &str = "canonical_schema";

// ============================================================================
// STATE RECORD
// ============================================================================

/// One row of the states table.
///
/// The state id is fixed at construction. The document is always a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    state_id: Option<StateId>,
    document: Document,
    column: DocumentColumn,
    shape: DocumentShape,
    created_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
}

impl StateRecord {
    pub fn new(state_id: StateId, document: Document) -> Self {
        Self {
            state_id: Some(state_id),
            document,
            column: DocumentColumn::default(),
            shape: DocumentShape::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// A record that arrived without a primary key. It can be read and
    /// edited but not persisted.
    pub fn without_id(document: Document) -> Self {
        Self {
            state_id: None,
            ..Self::new(Uuid::nil(), document)
        }
    }

    pub fn with_column(mut self, column: DocumentColumn) -> Self {
        self.column = column;
        self
    }

    pub fn with_shape(mut self, shape: DocumentShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_timestamps(mut self, created_at: Option<Timestamp>, updated_at: Option<Timestamp>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Ingest a raw row from an extraction source.
    ///
    /// The document is taken from `extracted_data` or `canonical_schema`,
    /// whichever the row populates (`extracted_data` first, null holders
    /// last). A row with neither gets an empty document. The document is normalized, so a
    /// null or malformed value never fails ingestion.
    pub fn from_raw_row(row: &RawRow, shape: DocumentShape) -> Result<Self, ValidationError> {
        let state_id = parse_state_id(row.get("state_id"))?;

        let column = DocumentColumn::holding(row);
        let document = row
            .get(column.as_str())
            .map(normalize_value)
            .unwrap_or_default();

        Ok(Self {
            state_id,
            document,
            column,
            shape,
            created_at: parse_timestamp("created_at", row.get("created_at"))?,
            updated_at: parse_timestamp("updated_at", row.get("updated_at"))?,
        })
    }

    /// Render back into the raw row shape extraction sources produce.
    pub fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::new();
        row.insert(
            "state_id".to_string(),
            self.state_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        row.insert(self.column.as_str().to_string(), Value::Object(self.document.clone()));
        row.insert("created_at".to_string(), timestamp_json(self.created_at));
        row.insert("updated_at".to_string(), timestamp_json(self.updated_at));
        row
    }

    pub fn state_id(&self) -> Option<StateId> {
        self.state_id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn column(&self) -> DocumentColumn {
        self.column
    }

    pub fn shape(&self) -> DocumentShape {
        self.shape
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    /// Replace the whole document, e.g. after a fresh read from storage.
    pub fn set_document(&mut self, document: Document) {
        self.document = document;
    }

    /// Apply an edit to the document in place.
    pub fn apply_edit(&mut self, edit: &FieldEdit) {
        apply_edit_in_place(&mut self.document, &edit.path, &edit.value);
    }

    pub fn read(&self, path: &FieldPath) -> Slot<&Value> {
        read_path(&self.document, path)
    }

    /// Move `updated_at` forward to `at`; never moves it backwards.
    pub fn touch(&mut self, at: Timestamp) -> Timestamp {
        let next = crate::merger::refreshed_updated_at(self.updated_at, at);
        self.updated_at = Some(next);
        next
    }

    pub fn fields(&self) -> DocumentFields {
        extract_fields(&self.document, self.shape)
    }
}

fn parse_state_id(value: Option<&Value>) -> Result<Option<StateId>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Uuid::parse_str(text.trim())
            .map(Some)
            .map_err(|e| ValidationError::InvalidStateId {
                value: text.clone(),
                reason: e.to_string(),
            }),
        Some(other) => Err(ValidationError::InvalidStateId {
            value: other.to_string(),
            reason: "expected a UUID string".to_string(),
        }),
    }
}

/// Parse a row timestamp.
///
/// Accepts RFC 3339 (how Postgres renders `timestamptz` in JSON) and
/// offset-less timestamps, which are taken as UTC. Missing and null read
/// as `None`.
pub fn parse_timestamp(field: &str, value: Option<&Value>) -> Result<Option<Timestamp>, ValidationError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) => text,
        Some(other) => {
            return Err(ValidationError::InvalidTimestamp {
                field: field.to_string(),
                value: other.to_string(),
            })
        }
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| ValidationError::InvalidTimestamp {
            field: field.to_string(),
            value: text.clone(),
        })
}

fn timestamp_json(value: Option<Timestamp>) -> Value {
    value
        .map(|ts| Value::String(ts.to_rfc3339()))
        .unwrap_or(Value::Null)
}

// ============================================================================
// STRUCTURED VIEW
// ============================================================================

/// Identifier and schema fields read out of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFields {
    pub trace_id: Slot<Value>,
    pub doc_id: Slot<Value>,
    pub workflow_id: Slot<Value>,
    pub tenant_id: Slot<Value>,
    pub step_id: Slot<Value>,
    pub canonical_schema: Slot<Value>,
}

/// Read the named sub-fields of a document.
///
/// Each field defaults independently. For [`DocumentShape::Nested`] a
/// missing `canonical_schema` falls back to the whole document; the
/// flattened shape has no fallback.
pub fn extract_fields(document: &Document, shape: DocumentShape) -> DocumentFields {
    let scalar = |key: &str| Slot::from_lookup(document.get(key)).cloned();

    let canonical_schema = match (Slot::from_lookup(document.get(CANONICAL_SCHEMA_KEY)), shape) {
        (Slot::Missing, DocumentShape::Nested) => Slot::Present(Value::Object(document.clone())),
        (slot, _) => slot.cloned(),
    };

    DocumentFields {
        trace_id: scalar("trace_id"),
        doc_id: scalar("doc_id"),
        workflow_id: scalar("workflow_id"),
        tenant_id: scalar("tenant_id"),
        step_id: scalar("step_id"),
        canonical_schema,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldValue;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    const ID: &str = "0192f0a4-7c1e-7b6a-9d2e-3f4a5b6c7d8e";

    #[test]
    fn test_from_raw_row_extracted_data() {
        let record = StateRecord::from_raw_row(
            &row(json!({
                "state_id": ID,
                "extracted_data": {"trace_id": "t1"},
                "created_at": "2025-01-02T03:04:05.123456+00:00",
                "updated_at": null
            })),
            DocumentShape::Flattened,
        )
        .unwrap();

        assert_eq!(record.state_id(), Some(Uuid::parse_str(ID).unwrap()));
        assert_eq!(record.column(), DocumentColumn::ExtractedData);
        assert_eq!(record.document()["trace_id"], json!("t1"));
        assert!(record.created_at().is_some());
        assert!(record.updated_at().is_none());
    }

    #[test]
    fn test_from_raw_row_canonical_schema_holder() {
        let record = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "canonical_schema": {"doc_id": "d1"}})),
            DocumentShape::Nested,
        )
        .unwrap();
        assert_eq!(record.column(), DocumentColumn::CanonicalSchema);
        assert_eq!(record.shape(), DocumentShape::Nested);
        assert_eq!(record.document()["doc_id"], json!("d1"));
    }

    #[test]
    fn test_from_raw_row_null_holder_yields_to_populated_one() {
        let record = StateRecord::from_raw_row(
            &row(json!({
                "state_id": ID,
                "extracted_data": null,
                "canonical_schema": {"trace_id": "t1", "parties": {"shipper": {}}}
            })),
            DocumentShape::Flattened,
        )
        .unwrap();
        assert_eq!(record.column(), DocumentColumn::CanonicalSchema);
        assert_eq!(record.document()["trace_id"], json!("t1"));

        let both_null = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "extracted_data": null, "canonical_schema": null})),
            DocumentShape::Flattened,
        )
        .unwrap();
        assert_eq!(both_null.column(), DocumentColumn::ExtractedData);
        assert!(both_null.document().is_empty());
    }

    #[test]
    fn test_from_raw_row_normalizes_bad_document() {
        let record = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "extracted_data": "not json"})),
            DocumentShape::Flattened,
        )
        .unwrap();
        assert!(record.document().is_empty());

        let record = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "extracted_data": null})),
            DocumentShape::Flattened,
        )
        .unwrap();
        assert!(record.document().is_empty());
    }

    #[test]
    fn test_from_raw_row_missing_state_id_is_none() {
        let record =
            StateRecord::from_raw_row(&row(json!({"extracted_data": {}})), DocumentShape::Flattened)
                .unwrap();
        assert_eq!(record.state_id(), None);
    }

    #[test]
    fn test_from_raw_row_invalid_state_id() {
        let err = StateRecord::from_raw_row(
            &row(json!({"state_id": "nope", "extracted_data": {}})),
            DocumentShape::Flattened,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidStateId { .. }));

        let err = StateRecord::from_raw_row(&row(json!({"state_id": 7})), DocumentShape::Flattened)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidStateId { .. }));
    }

    #[test]
    fn test_from_raw_row_naive_timestamp_is_utc() {
        let record = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "updated_at": "2025-01-02T03:04:05"})),
            DocumentShape::Flattened,
        )
        .unwrap();
        assert_eq!(
            record.updated_at(),
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_from_raw_row_invalid_timestamp() {
        let err = StateRecord::from_raw_row(
            &row(json!({"state_id": ID, "created_at": "yesterday"})),
            DocumentShape::Flattened,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidTimestamp {
                field: "created_at".to_string(),
                value: "yesterday".to_string()
            }
        );
    }

    #[test]
    fn test_raw_row_round_trip() {
        let created = Utc.with_ymd_and_hms(2025, 5, 6, 7, 8, 9).unwrap();
        let record = StateRecord::new(Uuid::parse_str(ID).unwrap(), row(json!({"a": {"b": 1}})))
            .with_column(DocumentColumn::CanonicalSchema)
            .with_timestamps(Some(created), Some(created));

        let again = StateRecord::from_raw_row(&record.to_raw_row(), DocumentShape::Flattened).unwrap();
        assert_eq!(again, record);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut record = StateRecord::new(Uuid::nil(), Document::new()).with_timestamps(None, Some(later));

        assert_eq!(record.touch(earlier), later);
        assert_eq!(record.updated_at(), Some(later));
    }

    #[test]
    fn test_record_apply_edit_and_read() {
        let mut record = StateRecord::new(Uuid::nil(), Document::new());
        let edit = FieldEdit::new(
            "canonical_schema.parties.consignee.name".parse().unwrap(),
            FieldValue::new("XYZ Corp", 0.7).unwrap(),
        );
        record.apply_edit(&edit);
        assert_eq!(
            record.read(&edit.path).cloned(),
            Slot::Present(json!({"value": "XYZ Corp", "confidence": 0.7}))
        );
    }

    #[test]
    fn test_extract_fields_flattened_no_fallback() {
        let document = row(json!({"trace_id": "t1", "step_id": null}));
        let fields = extract_fields(&document, DocumentShape::Flattened);
        assert_eq!(fields.trace_id.as_str(), Some("t1"));
        assert_eq!(fields.step_id, Slot::Null);
        assert_eq!(fields.doc_id, Slot::Missing);
        assert_eq!(fields.canonical_schema, Slot::Missing);
    }

    #[test]
    fn test_extract_fields_nested_falls_back_to_whole_document() {
        let document = row(json!({"trace_id": "t1", "parties": {}}));
        let fields = extract_fields(&document, DocumentShape::Nested);
        assert_eq!(fields.canonical_schema, Slot::Present(Value::Object(document.clone())));
    }

    #[test]
    fn test_extract_fields_nested_prefers_own_key() {
        let document = row(json!({"canonical_schema": {"parties": {}}}));
        let fields = extract_fields(&document, DocumentShape::Nested);
        assert_eq!(fields.canonical_schema, Slot::Present(json!({"parties": {}})));
    }
}
