//! Document normalization and field edits.
//!
//! Stored documents arrive as JSON objects, JSON text, or garbage. Reading
//! them never fails: anything that is not an object normalizes to an empty
//! document. Edits address a leaf by key path and create whatever
//! intermediate objects are missing.

use crate::error::{ParseError, ValidationError};
use crate::{Document, FieldValue, Slot};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// A stored document before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDocument {
    Null,
    Mapping(Document),
    Text(String),
    /// Any other JSON value (number, bool, array).
    Other(Value),
}

impl From<Value> for RawDocument {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawDocument::Null,
            Value::Object(map) => RawDocument::Mapping(map),
            Value::String(text) => RawDocument::Text(text),
            other => RawDocument::Other(other),
        }
    }
}

impl From<Option<Value>> for RawDocument {
    fn from(value: Option<Value>) -> Self {
        value.map_or(RawDocument::Null, RawDocument::from)
    }
}

/// Normalize a stored document into a mapping.
///
/// Null, unparseable text, text that parses to a non-object, and any other
/// value type all yield an empty document. Parse failures are logged, not
/// returned.
pub fn normalize(raw: RawDocument) -> Document {
    match raw {
        RawDocument::Null => Document::new(),
        RawDocument::Mapping(map) => map,
        RawDocument::Text(text) => parse_text(&text),
        RawDocument::Other(value) => {
            tracing::debug!(kind = value_kind(&value), "Non-object document normalized to empty");
            Document::new()
        }
    }
}

/// Normalize a JSON value taken straight from a row.
pub fn normalize_value(value: &Value) -> Document {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(text) => parse_text(text),
        Value::Null => Document::new(),
        other => normalize(RawDocument::Other(other.clone())),
    }
}

fn parse_text(text: &str) -> Document {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(
                kind = value_kind(&other),
                "Document text is valid JSON but not an object; using empty document"
            );
            Document::new()
        }
        Err(err) => {
            let parse_error = ParseError::from(&err);
            tracing::warn!(error = %parse_error, "Malformed document text; using empty document");
            Document::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialize a document to compact JSON text.
pub fn serialize_document(document: &Document) -> String {
    // A map of JSON values always serializes.
    Value::Object(document.clone()).to_string()
}

// ============================================================================
// FIELD PATHS
// ============================================================================

/// Non-empty sequence of mapping keys addressing a leaf in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Build a path from segments. Empty paths and empty segments are rejected.
    pub fn new<I, S>(segments: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        if let Some(position) = segments.iter().position(String::is_empty) {
            return Err(ValidationError::EmptySegment {
                path: segments.join("."),
                position,
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final key of the path.
    pub fn leaf(&self) -> &str {
        // Constructors guarantee at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether `key` at `depth` lies on this path.
    pub fn passes_through(&self, depth: usize, key: &str) -> bool {
        self.segments.get(depth).is_some_and(|segment| segment == key)
    }
}

impl FromStr for FieldPath {
    type Err = ValidationError;

    /// Parse dotted notation: `canonical_schema.parties.shipper.name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        Self::new(s.split('.'))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// A targeted edit: write `value` at `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub path: FieldPath,
    pub value: FieldValue,
}

impl FieldEdit {
    pub fn new(path: FieldPath, value: FieldValue) -> Self {
        Self { path, value }
    }
}

// ============================================================================
// EDITS
// ============================================================================

/// Write `value` at `path`, returning the edited document.
pub fn apply_edit(mut document: Document, path: &FieldPath, value: &FieldValue) -> Document {
    apply_edit_in_place(&mut document, path, value);
    document
}

/// Write `value` at `path` in place.
///
/// Missing intermediate keys become empty objects. An intermediate key that
/// holds a non-object value is replaced by an empty object. Everything off
/// the path is left untouched.
pub fn apply_edit_in_place(document: &mut Document, path: &FieldPath, value: &FieldValue) {
    let (leaf, parents) = match path.segments().split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = document;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Document::new()));
        if !slot.is_object() {
            tracing::debug!(segment = %segment, "Replacing non-object path segment");
            *slot = Value::Object(Document::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }

    current.insert(leaf.clone(), value.to_json());
}

/// Read the value at `path`.
pub fn read_path<'a>(document: &'a Document, path: &FieldPath) -> Slot<&'a Value> {
    let (leaf, parents) = match path.segments().split_last() {
        Some(split) => split,
        None => return Slot::Missing,
    };

    let mut current = document;
    for segment in parents {
        match current.get(segment) {
            Some(Value::Object(map)) => current = map,
            _ => return Slot::Missing,
        }
    }
    Slot::from_lookup(current.get(leaf))
}

// =============================================================================
// TESTS
// =============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1.0e6f64..1.0e6).prop_map(Value::from),
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z_]{1,8}", inner), 0..5)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect())),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::vec(("[a-z_]{1,8}", arb_json()), 0..6)
            .prop_map(|entries| entries.into_iter().collect())
    }

    fn arb_path() -> impl Strategy<Value = FieldPath> {
        prop::collection::vec("[a-z_]{1,8}", 1..5)
            .prop_map(|segments| FieldPath::new(segments).expect("non-empty segments"))
    }

    fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        ("[A-Za-z ]{0,16}", 0.0f64..=1.0)
            .prop_map(|(value, confidence)| FieldValue::new(value, confidence).expect("finite"))
    }

    /// Every key off the path, at every level the path passes through,
    /// is equal before and after.
    fn off_path_unchanged(before: &Document, after: &Document, path: &FieldPath, depth: usize) -> bool {
        let no_new_keys = after
            .keys()
            .all(|key| before.contains_key(key) || path.passes_through(depth, key));
        no_new_keys
            && before.iter().all(|(key, value)| {
                if !path.passes_through(depth, key) {
                    return after.get(key) == Some(value);
                }
                if depth + 1 == path.segments().len() {
                    return true;
                }
                match (value, after.get(key)) {
                    (Value::Object(b), Some(Value::Object(a))) => {
                        off_path_unchanged(b, a, path, depth + 1)
                    }
                    // a non-object intermediate is replaced wholesale
                    (_, Some(Value::Object(_))) => true,
                    _ => false,
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Malformed or null input never raises and never yields null.
        #[test]
        fn prop_normalize_garbage_text_is_empty(text in "[^{}]*") {
            prop_assert!(normalize(RawDocument::Text(text)).is_empty());
        }

        #[test]
        fn prop_normalize_non_object_values_are_empty(value in arb_json()) {
            let expected_empty = !value.is_object();
            let normalized = normalize(RawDocument::from(value));
            if expected_empty {
                prop_assert!(normalized.is_empty());
            }
        }

        /// normalize(serialize(normalize(x))) == normalize(x)
        #[test]
        fn prop_normalize_round_trip(value in arb_json()) {
            let once = normalize(RawDocument::from(value));
            let again = normalize(RawDocument::Text(serialize_document(&once)));
            prop_assert_eq!(again, once);
        }

        /// Reading the edited path yields exactly the written value.
        #[test]
        fn prop_apply_edit_then_read(document in arb_document(), path in arb_path(), value in arb_field_value()) {
            let edited = apply_edit(document, &path, &value);
            let expected = value.to_json();
            prop_assert_eq!(read_path(&edited, &path), Slot::Present(&expected));
        }

        /// Everything off the path is structurally unchanged.
        #[test]
        fn prop_apply_edit_preserves_off_path(document in arb_document(), path in arb_path(), value in arb_field_value()) {
            let edited = apply_edit(document.clone(), &path, &value);
            prop_assert!(off_path_unchanged(&document, &edited, &path, 0));
        }

        #[test]
        fn prop_apply_edit_idempotent(document in arb_document(), path in arb_path(), value in arb_field_value()) {
            let once = apply_edit(document, &path, &value);
            let twice = apply_edit(once.clone(), &path, &value);
            prop_assert_eq!(twice, once);
        }
    }
}
