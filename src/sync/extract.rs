//! Field extraction
//!
//! Flattens a card's field list into `stable id → value`. Labels are dropped
//! on purpose: only `internal_id` survives a rename in the Pipefy UI.

use super::card::{CardField, ExternalCard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat map of stable field identifier → text value
///
/// Stored verbatim as the project's `meta` payload. Downstream code reads the
/// typed attributes produced by the mapper, not this map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, Option<String>>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field_id: impl Into<String>, value: Option<String>) {
        self.0.insert(field_id.into(), value);
    }

    /// Value for a stable id; `None` when absent or null
    pub fn value(&self, field_id: &str) -> Option<&str> {
        self.0.get(field_id).and_then(|v| v.as_deref())
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.0.contains_key(field_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Stable identifier of a field entry, if it has a usable one
fn stable_id(field: &CardField) -> Option<&str> {
    field
        .field
        .as_ref()
        .and_then(|f| f.internal_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Normalize a raw field value to text
fn value_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Extract the stable-id map from a card
///
/// Never fails. Entries without a stable id are skipped; when two entries
/// share an id the later one wins.
pub fn extract_fields(card: &ExternalCard) -> FieldMap {
    let mut map = FieldMap::new();

    for field in &card.fields {
        match stable_id(field) {
            Some(id) => map.insert(id, value_text(field.value.as_ref())),
            None => tracing::trace!(
                card = %card.id,
                label = field.name.as_deref().unwrap_or(""),
                "Skipping field without stable identifier"
            ),
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::card::FieldRef;

    fn raw(label: &str, internal_id: Option<&str>, value: serde_json::Value) -> CardField {
        CardField {
            name: Some(label.to_string()),
            value: Some(value),
            field: Some(FieldRef {
                id: None,
                label: Some(label.to_string()),
                internal_id: internal_id.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_keys_on_internal_id() {
        let card = ExternalCard::new("1", "Card")
            .with_field("Responsável", "owner_fid", "ana@example.com")
            .with_field("Horas", "hours_fid", "12");

        let map = extract_fields(&card);
        assert_eq!(map.len(), 2);
        assert_eq!(map.value("owner_fid"), Some("ana@example.com"));
        assert!(!map.contains("Responsável"));
    }

    #[test]
    fn test_drops_entries_without_stable_id() {
        let card = ExternalCard::new("1", "Card")
            .with_raw_field(raw("No id", None, serde_json::json!("x")))
            .with_raw_field(raw("Blank id", Some("  "), serde_json::json!("y")))
            .with_raw_field(CardField {
                name: Some("No definition".to_string()),
                value: Some(serde_json::json!("z")),
                field: None,
            });

        assert!(extract_fields(&card).is_empty());
    }

    #[test]
    fn test_value_normalization() {
        let card = ExternalCard::new("1", "Card")
            .with_raw_field(raw("n", Some("num"), serde_json::json!(8.5)))
            .with_raw_field(raw("b", Some("flag"), serde_json::json!(true)))
            .with_raw_field(raw("l", Some("list"), serde_json::json!(["a", "b"])))
            .with_raw_field(raw("z", Some("null"), serde_json::Value::Null));

        let map = extract_fields(&card);
        assert_eq!(map.value("num"), Some("8.5"));
        assert_eq!(map.value("flag"), Some("true"));
        assert_eq!(map.value("list"), Some("[\"a\",\"b\"]"));
        // Present in the map but null
        assert!(map.contains("null"));
        assert_eq!(map.value("null"), None);
    }

    #[test]
    fn test_meta_json_shape() {
        let card = ExternalCard::new("1", "Card").with_field("Status", "status_fid", "Doing");
        let json = extract_fields(&card).to_json().unwrap();
        assert_eq!(json, r#"{"status_fid":"Doing"}"#);
        assert_eq!(FieldMap::from_json(&json).unwrap().value("status_fid"), Some("Doing"));
    }
}
