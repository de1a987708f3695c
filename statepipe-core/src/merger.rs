//! Persistence payloads for edited records.
//!
//! The payload carries plain primitives only (id text, JSON text, a
//! timestamp) so both a targeted SQL update and a full-record upsert can
//! consume it without driver-specific wrapper types.

use crate::document::{serialize_document, FieldEdit};
use crate::error::ValidationError;
use crate::record::StateRecord;
use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What a persistence call needs to write one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPayload {
    /// Hyphenated UUID text.
    pub state_id: String,
    /// Compact JSON text of the document.
    pub document: String,
    pub updated_at: Timestamp,
}

/// Next `updated_at` for a record last updated at `previous`.
///
/// Clock skew can put `now` behind a stored timestamp; the result never
/// goes backwards.
pub fn refreshed_updated_at(previous: Option<Timestamp>, now: Timestamp) -> Timestamp {
    match previous {
        Some(previous) if previous > now => previous,
        _ => now,
    }
}

/// Build the persistence payload for a record, stamped with the current time.
pub fn to_persisted_payload(record: &StateRecord) -> Result<PersistedPayload, ValidationError> {
    to_persisted_payload_at(record, Utc::now())
}

/// Build the persistence payload for a record, stamped at `now`.
pub fn to_persisted_payload_at(
    record: &StateRecord,
    now: Timestamp,
) -> Result<PersistedPayload, ValidationError> {
    let state_id = record.state_id().ok_or(ValidationError::MissingStateId)?;
    Ok(PersistedPayload {
        state_id: state_id.to_string(),
        document: serialize_document(record.document()),
        updated_at: refreshed_updated_at(record.updated_at(), now),
    })
}

/// Apply `edit` to `record` and produce its payload.
///
/// Records without an id are rejected before the document is touched.
/// On success the record's `updated_at` matches the payload.
pub fn merge_edit(record: &mut StateRecord, edit: &FieldEdit) -> Result<PersistedPayload, ValidationError> {
    if record.state_id().is_none() {
        return Err(ValidationError::MissingStateId);
    }
    record.apply_edit(edit);
    let payload = to_persisted_payload(record)?;
    record.touch(payload.updated_at);
    tracing::debug!(
        state_id = %payload.state_id,
        path = %edit.path,
        "Merged field edit"
    );
    Ok(payload)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, FieldValue};
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn edit() -> FieldEdit {
        FieldEdit::new(
            "canonical_schema.parties.shipper.name".parse().unwrap(),
            FieldValue::new("ABC Logistics", 0.98).unwrap(),
        )
    }

    #[test]
    fn test_payload_serializes_id_and_document() {
        let id = Uuid::now_v7();
        let document = json!({"trace_id": "t1"}).as_object().cloned().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let payload = to_persisted_payload_at(&StateRecord::new(id, document), now).unwrap();

        assert_eq!(payload.state_id, id.to_string());
        assert_eq!(payload.document, r#"{"trace_id":"t1"}"#);
        assert_eq!(payload.updated_at, now);
    }

    #[test]
    fn test_payload_missing_state_id_fails() {
        let record = StateRecord::without_id(Document::new());
        assert_eq!(to_persisted_payload(&record), Err(ValidationError::MissingStateId));
    }

    #[test]
    fn test_payload_updated_at_never_regresses() {
        let stored = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let record = StateRecord::new(Uuid::nil(), Document::new()).with_timestamps(None, Some(stored));

        let payload = to_persisted_payload_at(&record, now).unwrap();
        assert_eq!(payload.updated_at, stored);
    }

    #[test]
    fn test_merge_edit_updates_record_and_payload() {
        let mut record = StateRecord::new(Uuid::now_v7(), Document::new());
        let payload = merge_edit(&mut record, &edit()).unwrap();

        let persisted: Value = serde_json::from_str(&payload.document).unwrap();
        assert_eq!(
            persisted["canonical_schema"]["parties"]["shipper"]["name"],
            json!({"value": "ABC Logistics", "confidence": 0.98})
        );
        assert_eq!(record.updated_at(), Some(payload.updated_at));
    }

    #[test]
    fn test_merge_edit_without_id_leaves_document_alone() {
        let mut record = StateRecord::without_id(Document::new());
        assert_eq!(merge_edit(&mut record, &edit()), Err(ValidationError::MissingStateId));
        assert!(record.document().is_empty());
    }

    #[test]
    fn test_payload_serde_shape() {
        let payload = PersistedPayload {
            state_id: Uuid::nil().to_string(),
            document: "{}".to_string(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["document"], json!("{}"));
        assert_eq!(value["updated_at"], json!("2025-01-01T00:00:00Z"));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::Document;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::Value;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A record without an id never yields a payload, whatever its document.
        #[test]
        fn prop_missing_state_id_always_fails(entries in prop::collection::vec(("[a-z]{1,6}", "[a-z]{0,6}"), 0..8)) {
            let document: Document = entries
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let record = StateRecord::without_id(document);
            prop_assert_eq!(to_persisted_payload(&record), Err(ValidationError::MissingStateId));
        }

        #[test]
        fn prop_refreshed_updated_at_is_monotonic(previous in 0i64..4_000_000_000, now in 0i64..4_000_000_000) {
            let previous = Utc.timestamp_opt(previous, 0).single().expect("in range");
            let now_ts = Utc.timestamp_opt(now, 0).single().expect("in range");
            let next = refreshed_updated_at(Some(previous), now_ts);
            prop_assert!(next >= previous);
            prop_assert!(next >= now_ts);
        }
    }
}
