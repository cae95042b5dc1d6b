//! Data models for research descriptions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Maximum length of the `type` column, in characters (`VARCHAR(10)`).
pub const MAX_TYPE_LEN: usize = 10;

/// Description kind for narrative content.
pub const KIND_TEXT: &str = "text";

/// Description kind for polygon geometry.
pub const KIND_POLYGON: &str = "polygon";

/// Description kind for a single point.
pub const KIND_POINT: &str = "point";

/// Kinds understood by the geometry checks.
pub const KNOWN_KINDS: &[&str] = &[KIND_TEXT, KIND_POLYGON, KIND_POINT];

/// A stored row of `research_description`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchDescription {
    /// Engine-assigned identifier.
    pub id: i32,
    /// Parent research record.
    pub research_id: i32,
    /// Description kind, stored in the `type` column.
    #[serde(rename = "type")]
    pub kind: String,
    /// Structured document, usually geometry.
    pub polygon_data: Option<JsonValue>,
    /// Free text.
    pub text: Option<String>,
}

impl ResearchDescription {
    /// Apply a patch in place. Fields absent from the patch are left alone.
    pub fn apply(&mut self, patch: ResearchDescriptionPatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(polygon_data) = patch.polygon_data {
            self.polygon_data = polygon_data;
        }
        if let Some(text) = patch.text {
            self.text = text;
        }
    }

    /// View the stored record as creation input, for re-validation.
    pub fn as_new(&self) -> NewResearchDescription {
        NewResearchDescription {
            research_id: self.research_id,
            kind: self.kind.clone(),
            polygon_data: self.polygon_data.clone(),
            text: self.text.clone(),
        }
    }
}

/// Input for creating a description. The id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResearchDescription {
    pub research_id: i32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub polygon_data: Option<JsonValue>,
    #[serde(default)]
    pub text: Option<String>,
}

impl NewResearchDescription {
    /// A narrative description.
    pub fn text(research_id: i32, text: impl Into<String>) -> Self {
        Self {
            research_id,
            kind: KIND_TEXT.to_string(),
            polygon_data: None,
            text: Some(text.into()),
        }
    }

    /// A polygon description carrying a structured document.
    pub fn polygon(research_id: i32, polygon_data: JsonValue) -> Self {
        Self {
            research_id,
            kind: KIND_POLYGON.to_string(),
            polygon_data: Some(polygon_data),
            text: None,
        }
    }

    /// Attach free text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Partial update of a description.
///
/// The outer `Option` says whether the field is part of the patch; for the
/// nullable columns the inner `Option` is the new value, so `Some(None)`
/// clears the column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchDescriptionPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub polygon_data: Option<Option<JsonValue>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<Option<String>>,
}

impl ResearchDescriptionPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.polygon_data.is_none() && self.text.is_none()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn polygon_data(mut self, polygon_data: Option<JsonValue>) -> Self {
        self.polygon_data = Some(polygon_data);
        self
    }

    pub fn text(mut self, text: Option<String>) -> Self {
        self.text = Some(text);
        self
    }
}

// A key that is present maps to `Some(..)`, even when its value is null.
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Ordering for listings. Without one, rows come back in engine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    IdAscending,
    IdDescending,
}

impl std::str::FromStr for ListOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "id_ascending" => Ok(Self::IdAscending),
            "desc" | "id_descending" => Ok(Self::IdDescending),
            other => Err(format!("Unknown list order '{}': expected asc or desc", other)),
        }
    }
}

/// Outcome of provisioning the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    /// The table did not exist and was created.
    Created,
    /// The table already existed with the expected shape.
    AlreadyPresent,
}
