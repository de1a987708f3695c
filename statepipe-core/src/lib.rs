//! Statepipe Core - State Records and the Canonical Document Merger
//!
//! Pure data structures and transforms for rows of the states table.
//! Nothing in this crate performs I/O; extraction and persistence live
//! behind the repository trait in `statepipe-storage`.

pub mod document;
pub mod dsn;
pub mod error;
pub mod filter;
pub mod merger;
pub mod record;

pub use document::{
    apply_edit, apply_edit_in_place, normalize, normalize_value, read_path, serialize_document,
    FieldEdit, FieldPath, RawDocument,
};
pub use dsn::{normalize_dsn, redact_dsn};
pub use error::{
    ConfigError, NotFoundError, ParseError, StateError, StateResult, StorageError,
    ValidationError,
};
pub use filter::{IdentityFilter, IdentityKey};
pub use merger::{
    merge_edit, refreshed_updated_at, to_persisted_payload, to_persisted_payload_at,
    PersistedPayload,
};
pub use record::{extract_fields, parse_timestamp, DocumentFields, StateRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Primary key of a state row.
pub type StateId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// A JSON object document. Never null once normalized.
pub type Document = serde_json::Map<String, Value>;

/// Raw row as handed over by an extraction source.
pub type RawRow = serde_json::Map<String, Value>;

/// Generate a new UUIDv7 state id (timestamp-sortable).
pub fn new_state_id() -> StateId {
    Uuid::now_v7()
}

// ============================================================================
// OPTIONAL-FIELD CONTRACT
// ============================================================================

/// Result of looking up a key in a document.
///
/// Keeps "key absent" and "key present but null" apart so callers can
/// tell them apart instead of collapsing both into `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// The key does not exist.
    Missing,
    /// The key exists and holds JSON null.
    Null,
    /// The key exists and holds a value.
    Present(T),
}

impl<T> Slot<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Slot::Missing)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Slot::Present(_))
    }

    /// Collapse to an `Option`, treating missing and null alike.
    pub fn present(self) -> Option<T> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Missing | Slot::Null => None,
        }
    }

    pub fn as_ref(&self) -> Slot<&T> {
        match self {
            Slot::Missing => Slot::Missing,
            Slot::Null => Slot::Null,
            Slot::Present(value) => Slot::Present(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Slot<U> {
        match self {
            Slot::Missing => Slot::Missing,
            Slot::Null => Slot::Null,
            Slot::Present(value) => Slot::Present(f(value)),
        }
    }
}

impl<'a> Slot<&'a Value> {
    /// Classify the result of a map lookup.
    pub fn from_lookup(value: Option<&'a Value>) -> Self {
        match value {
            None => Slot::Missing,
            Some(Value::Null) => Slot::Null,
            Some(value) => Slot::Present(value),
        }
    }

    pub fn cloned(self) -> Slot<Value> {
        self.map(Value::clone)
    }
}

impl Slot<Value> {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Slot::Present(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// JSON view of the slot; missing and null both read as null.
    pub fn to_json(&self) -> Value {
        match self {
            Slot::Present(value) => value.clone(),
            Slot::Missing | Slot::Null => Value::Null,
        }
    }
}

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Leaf written by an edit: an extracted value and the extractor's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub confidence: f64,
}

impl FieldValue {
    /// Build a field value. The confidence must be finite, since JSON has
    /// no representation for NaN or infinities.
    pub fn new(value: impl Into<String>, confidence: f64) -> Result<Self, ValidationError> {
        if !confidence.is_finite() {
            return Err(ValidationError::InvalidConfidence {
                value: confidence.to_string(),
            });
        }
        Ok(Self {
            value: value.into(),
            confidence,
        })
    }

    /// The `{value, confidence}` object stored in the document.
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::with_capacity(2);
        object.insert("value".to_string(), Value::String(self.value.clone()));
        object.insert(
            "confidence".to_string(),
            serde_json::Number::from_f64(self.confidence)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        Value::Object(object)
    }
}

// ============================================================================
// DOCUMENT LAYOUT
// ============================================================================

/// How identifiers sit inside a stored document.
///
/// Resolved once when a row is ingested and carried on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentShape {
    /// Identifiers live at the top level of the document and the
    /// canonical schema is read only from its own key.
    #[default]
    Flattened,
    /// The whole document is one payload; identifiers are decomposed into
    /// attributes and a missing `canonical_schema` falls back to the
    /// whole document.
    Nested,
}

impl DocumentShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentShape::Flattened => "flattened",
            DocumentShape::Nested => "nested",
        }
    }
}

impl fmt::Display for DocumentShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentShape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flattened" | "flat" => Ok(DocumentShape::Flattened),
            "nested" => Ok(DocumentShape::Nested),
            other => Err(ConfigError::InvalidValue {
                field: "document_shape".to_string(),
                value: other.to_string(),
                reason: "expected 'flattened' or 'nested'".to_string(),
            }),
        }
    }
}

/// Column that holds the document in a states row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentColumn {
    #[default]
    ExtractedData,
    CanonicalSchema,
}

impl DocumentColumn {
    /// Lookup order when a row carries both holders.
    pub const ALL: [DocumentColumn; 2] =
        [DocumentColumn::ExtractedData, DocumentColumn::CanonicalSchema];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentColumn::ExtractedData => "extracted_data",
            DocumentColumn::CanonicalSchema => "canonical_schema",
        }
    }

    /// The column a raw row keeps its document in.
    ///
    /// A holder with a non-null value wins over one that is null, so a row
    /// with `extracted_data: null` and a populated `canonical_schema` reads
    /// the latter. Falls back to the first holder present, then the default.
    pub fn holding(row: &RawRow) -> DocumentColumn {
        let populated = DocumentColumn::ALL
            .into_iter()
            .find(|column| row.get(column.as_str()).is_some_and(|value| !value.is_null()));
        populated
            .or_else(|| {
                DocumentColumn::ALL
                    .into_iter()
                    .find(|column| row.contains_key(column.as_str()))
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for DocumentColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentColumn {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentColumn::ALL
            .into_iter()
            .find(|column| column.as_str() == s.trim())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "document_column".to_string(),
                value: s.to_string(),
                reason: "expected 'extracted_data' or 'canonical_schema'".to_string(),
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
