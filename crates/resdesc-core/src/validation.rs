//! Validation of research descriptions before persistence.
//!
//! Everything here is pure: no I/O, no database. Repositories call
//! [`validate`] and turn a non-empty [`ValidationReport`] into
//! [`Error::Validation`](crate::Error::Validation).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::geometry::{self, GeometryError};
use crate::models::{NewResearchDescription, KIND_POINT, KIND_POLYGON, KIND_TEXT, MAX_TYPE_LEN};

/// Which `type` values are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "kinds")]
pub enum TypeVocabulary {
    /// Any non-empty value within the length bound.
    #[default]
    Open,
    /// Only the listed values.
    Closed(Vec<String>),
}

impl TypeVocabulary {
    pub fn allows(&self, kind: &str) -> bool {
        match self {
            TypeVocabulary::Open => true,
            TypeVocabulary::Closed(kinds) => kinds.iter().any(|k| k == kind),
        }
    }
}

/// Knobs of the validation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub vocabulary: TypeVocabulary,
    /// Require `polygon_data` or `text` to be present.
    pub require_content: bool,
    /// Check geometry of `polygon` and `point` descriptions, and require
    /// non-blank text on `text`, `polygon` and `point` descriptions.
    pub strict_geometry: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            vocabulary: TypeVocabulary::Open,
            require_content: true,
            strict_geometry: false,
        }
    }
}

impl ValidationPolicy {
    /// Policy matching the rules of the ingestion application: closed
    /// vocabulary of known kinds and strict geometry.
    pub fn strict() -> Self {
        Self {
            vocabulary: TypeVocabulary::Closed(
                crate::models::KNOWN_KINDS
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
            ),
            require_content: true,
            strict_geometry: true,
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: TypeVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn require_content(mut self, require: bool) -> Self {
        self.require_content = require;
        self
    }

    pub fn strict_geometry(mut self, strict: bool) -> Self {
        self.strict_geometry = strict;
        self
    }
}

/// A single reason a description was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    EmptyType,
    TypeTooLong { len: usize },
    UnknownType { kind: String },
    MalformedJson { message: String },
    NotStructured,
    MissingContent,
    MissingText,
    /// PostgreSQL text cannot hold U+0000.
    NulCharacter { field: &'static str },
    Geometry(GeometryError),
    DuplicateText { research_id: i32 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::EmptyType => write!(f, "type must not be empty"),
            Violation::TypeTooLong { len } => write!(
                f,
                "type must be {} characters or less, got {}",
                MAX_TYPE_LEN, len
            ),
            Violation::UnknownType { kind } => write!(f, "type '{}' is not allowed", kind),
            Violation::MalformedJson { message } => {
                write!(f, "polygon_data is not valid JSON: {}", message)
            }
            Violation::NotStructured => {
                write!(f, "polygon_data must be a JSON object or array")
            }
            Violation::MissingContent => {
                write!(f, "at least one of polygon_data or text is required")
            }
            Violation::MissingText => write!(f, "text is required for this type"),
            Violation::NulCharacter { field } => {
                write!(f, "{} must not contain NUL characters", field)
            }
            Violation::Geometry(e) => write!(f, "polygon_data: {}", e),
            Violation::DuplicateText { research_id } => write!(
                f,
                "there can be no more than one text description for research {}",
                research_id
            ),
        }
    }
}

/// All violations found for one record or batch. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn contains(&self, violation: &Violation) -> bool {
        self.violations.contains(violation)
    }

    /// `Ok(())` when valid, otherwise the report as an error.
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(crate::Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl From<Vec<Violation>> for ValidationReport {
    fn from(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}

/// Parse raw `polygon_data` input into a structured document.
pub fn parse_structured(raw: &str) -> std::result::Result<JsonValue, Violation> {
    let value: JsonValue =
        serde_json::from_str(raw).map_err(|e| Violation::MalformedJson {
            message: e.to_string(),
        })?;
    if is_structured(&value) {
        Ok(value)
    } else {
        Err(Violation::NotStructured)
    }
}

fn is_structured(value: &JsonValue) -> bool {
    value.is_object() || value.is_array()
}

/// Whether any string or key inside the document contains U+0000.
fn contains_nul(value: &JsonValue) -> bool {
    match value {
        JsonValue::String(s) => s.contains('\0'),
        JsonValue::Array(items) => items.iter().any(contains_nul),
        JsonValue::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || contains_nul(value)),
        _ => false,
    }
}

/// Check the `type` tag alone.
pub fn validate_kind(kind: &str, vocabulary: &TypeVocabulary) -> Vec<Violation> {
    let mut violations = Vec::new();
    let len = kind.chars().count();

    if kind.trim().is_empty() {
        violations.push(Violation::EmptyType);
    } else if len > MAX_TYPE_LEN {
        violations.push(Violation::TypeTooLong { len });
    } else if !vocabulary.allows(kind) {
        violations.push(Violation::UnknownType {
            kind: kind.to_string(),
        });
    }

    if kind.contains('\0') {
        violations.push(Violation::NulCharacter { field: "type" });
    }

    violations
}

/// Validate one description against a policy.
pub fn validate(record: &NewResearchDescription, policy: &ValidationPolicy) -> ValidationReport {
    let mut report = ValidationReport::from(validate_kind(&record.kind, &policy.vocabulary));

    if let Some(data) = &record.polygon_data {
        if !is_structured(data) {
            report.push(Violation::NotStructured);
        }
        if contains_nul(data) {
            report.push(Violation::NulCharacter {
                field: "polygon_data",
            });
        }
    }

    if record.text.as_deref().is_some_and(|t| t.contains('\0')) {
        report.push(Violation::NulCharacter { field: "text" });
    }

    if policy.require_content && record.polygon_data.is_none() && record.text.is_none() {
        report.push(Violation::MissingContent);
    }

    if policy.strict_geometry {
        check_kind_content(record, &mut report);
    }

    report
}

fn check_kind_content(record: &NewResearchDescription, report: &mut ValidationReport) {
    let geometry = match record.kind.as_str() {
        KIND_POLYGON => record
            .polygon_data
            .as_ref()
            .map(|data| geometry::parse_polygon_document(data).map(|_| ())),
        KIND_POINT => record
            .polygon_data
            .as_ref()
            .map(|data| geometry::parse_point_document(data).map(|_| ())),
        KIND_TEXT => Some(Ok(())),
        _ => return,
    };

    match geometry {
        Some(Ok(())) => {}
        Some(Err(e)) => report.push(Violation::Geometry(e)),
        None => report.push(Violation::Geometry(GeometryError::MissingCoordinates)),
    }

    // Every known kind carries a caption.
    if record.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
        report.push(Violation::MissingText);
    }
}

/// Validate a batch destined for one transaction.
///
/// Adds the cross-record rule that a research has at most one `text`
/// description within the batch.
pub fn validate_batch(
    records: &[NewResearchDescription],
    policy: &ValidationPolicy,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut text_counts: HashMap<i32, usize> = HashMap::new();

    for record in records {
        for violation in validate(record, policy).violations {
            report.push(violation);
        }
        if record.kind == KIND_TEXT {
            *text_counts.entry(record.research_id).or_default() += 1;
        }
    }

    let mut duplicated: Vec<i32> = text_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(research_id, _)| research_id)
        .collect();
    duplicated.sort_unstable();
    for research_id in duplicated {
        report.push(Violation::DuplicateText { research_id });
    }

    report
}
