//! Match candidates, extraction results and annotation records.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::template::{Coordinates, FieldType};

/// Provenance of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Template defaults, no evidence from the document.
    TemplateCoordinates,
    /// Keyword anchor found in the text.
    KeywordOffset,
    /// Role-specific pattern found in the text.
    Regex,
    /// Proposed by the language model.
    Llm,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TemplateCoordinates => "template_coordinates",
            Strategy::KeywordOffset => "keyword_offset",
            Strategy::Regex => "regex",
            Strategy::Llm => "llm",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located field occurrence produced by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Target-space rectangle.
    pub coordinates: Coordinates,
    /// 1-based.
    pub page_number: u32,
    /// Within [0, 1].
    pub confidence: f64,
    pub strategy: Strategy,
    /// Human-readable rationale.
    pub note: String,
    pub value: Option<String>,
}

/// One annotation-ready row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub field_name: String,
    pub field_type: FieldType,
    pub value: Option<String>,
    pub page_number: u32,
    pub coordinates: Coordinates,
    /// Reflects the strategy that produced the coordinates.
    pub confidence: f64,
    pub strategy: Strategy,
}

impl ExtractionResult {
    pub fn from_candidate(field_name: &str, field_type: FieldType, candidate: MatchCandidate) -> Self {
        Self {
            field_name: field_name.to_string(),
            field_type,
            value: candidate.value,
            page_number: candidate.page_number,
            coordinates: candidate.coordinates,
            confidence: candidate.confidence,
            strategy: candidate.strategy,
        }
    }
}

/// Diagnostic record for one emitted candidate or one rejected input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    pub field_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// `None` for notes that do not describe a candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub confidence: f64,
    pub note: String,
}

impl MatchDetail {
    pub fn for_candidate(field_name: &str, candidate: &MatchCandidate) -> Self {
        Self {
            field_name: field_name.to_string(),
            page_number: Some(candidate.page_number),
            strategy: Some(candidate.strategy),
            confidence: candidate.confidence,
            note: candidate.note.clone(),
        }
    }

    /// A note not tied to any candidate.
    pub fn note(scope: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            field_name: scope.into(),
            page_number: None,
            strategy: None,
            confidence: 0.0,
            note: note.into(),
        }
    }

    pub fn is_candidate(&self) -> bool {
        self.strategy.is_some()
    }
}

/// A persisted annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub document_id: String,
    pub field_name: String,
    /// Display label for the field.
    pub label: String,
    pub annotation_type: FieldType,
    pub page_number: u32,
    #[serde(default)]
    pub field_value: Option<String>,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub confidence: f64,
}

impl AnnotationRecord {
    pub fn from_result(document_id: &str, label: impl Into<String>, result: &ExtractionResult) -> Self {
        Self {
            document_id: document_id.to_string(),
            field_name: result.field_name.clone(),
            label: label.into(),
            annotation_type: result.field_type,
            page_number: result.page_number,
            field_value: result.value.clone(),
            coordinates: result.coordinates.clone(),
            confidence: result.confidence,
        }
    }
}

/// How results are applied to a document that already has annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Add every result; re-applying a template duplicates annotations.
    #[default]
    Append,
    /// Skip results whose field already has an annotation on the document,
    /// including one added earlier in the same batch.
    SkipExistingFields,
}

/// Select which new records get persisted next to `existing`.
pub fn materialize(
    existing: &[AnnotationRecord],
    incoming: Vec<AnnotationRecord>,
    policy: ApplyPolicy,
) -> Vec<AnnotationRecord> {
    match policy {
        ApplyPolicy::Append => incoming,
        ApplyPolicy::SkipExistingFields => {
            let mut seen: HashSet<(String, String)> = existing
                .iter()
                .map(|a| (a.document_id.clone(), a.field_name.clone()))
                .collect();
            incoming
                .into_iter()
                .filter(|a| seen.insert((a.document_id.clone(), a.field_name.clone())))
                .collect()
        }
    }
}
