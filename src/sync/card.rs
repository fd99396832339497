//! External card snapshot
//!
//! The shape Pipefy returns for a card node inside either query shape:
//!
//! ```text
//! node { id title fields { name value field { id label internal_id } } }
//! ```

use serde::{Deserialize, Serialize};

/// One work item fetched from the remote tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCard {
    /// Source-assigned id, the natural key of the synced project
    pub id: String,

    /// Untitled cards arrive as `null`
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<CardField>,
}

/// One field entry on a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardField {
    /// Human-editable label at fetch time
    #[serde(default)]
    pub name: Option<String>,

    /// Raw value; Pipefy sends text but some field types arrive as numbers or lists
    #[serde(default)]
    pub value: Option<serde_json::Value>,

    /// Field definition, carrying the stable identifier
    #[serde(default)]
    pub field: Option<FieldRef>,
}

/// Field definition attached to a card field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    /// Stable across label renames
    #[serde(default)]
    pub internal_id: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExternalCard {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields: Vec::new(),
        }
    }

    /// Add a text field with a stable identifier
    pub fn with_field(
        mut self,
        label: impl Into<String>,
        internal_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let label = label.into();
        self.fields.push(CardField {
            name: Some(label.clone()),
            value: Some(serde_json::Value::String(value.into())),
            field: Some(FieldRef {
                id: None,
                label: Some(label),
                internal_id: Some(internal_id.into()),
            }),
        });
        self
    }

    /// Add a field entry exactly as given
    pub fn with_raw_field(mut self, field: CardField) -> Self {
        self.fields.push(field);
        self
    }
}

/// A field definition as listed by field inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub internal_id: Option<String>,

    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
}
