//! LLM reconciler: asks the model for every field at once and validates
//! the answer field by field.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::protocol::extract_json;
use super::{LlmRequest, LlmTransport};
use crate::error::RemoteExtractionError;
use crate::extraction::matcher::LlmOverride;
use crate::extraction::normalizer::CoordinateNormalizer;
use crate::extraction::presets::PresetTable;
use crate::layout::{BBox, Document};
use crate::models::config::{LlmConfig, MatchingConfig};
use crate::models::template::{Coordinates, Template};

const SYSTEM_PROMPT: &str = "You extract field values from a document given as text fragments \
with bounding boxes. Answer with a single JSON object and nothing else.";

/// One validated model answer.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmField {
    pub value: Option<String>,
    /// 1-based, within the document.
    pub page_number: u32,
    /// Source units, as returned by the model.
    pub bbox: Option<BBox>,
    pub confidence: f64,
    /// `bbox` in target units.
    pub coordinates: Option<Coordinates>,
}

impl LlmField {
    /// Usable as a matcher override when the model gave a box.
    pub fn as_override(&self) -> Option<LlmOverride> {
        self.coordinates.as_ref().map(|coordinates| LlmOverride {
            coordinates: coordinates.clone(),
            page_number: self.page_number,
            value: self.value.clone(),
            confidence: self.confidence,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Answer {
    fields: Vec<AnswerField>,
}

#[derive(Debug, Deserialize)]
struct AnswerField {
    field_name: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    bbox: Option<Value>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Language-model evidence source.
pub struct LlmReconciler {
    transport: Box<dyn LlmTransport + Send + Sync>,
    config: LlmConfig,
    presets: PresetTable,
    normalizer: CoordinateNormalizer,
    line_merge_ratio: f64,
}

impl LlmReconciler {
    pub fn new(transport: Box<dyn LlmTransport + Send + Sync>, config: LlmConfig) -> Self {
        Self {
            transport,
            config,
            presets: PresetTable::builtin(),
            normalizer: CoordinateNormalizer::default(),
            line_merge_ratio: MatchingConfig::default().line_merge_ratio,
        }
    }

    pub fn with_presets(mut self, presets: PresetTable) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_normalizer(mut self, normalizer: CoordinateNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_line_merge_ratio(mut self, ratio: f64) -> Self {
        self.line_merge_ratio = ratio;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Validated answers keyed by field name.
    ///
    /// Fails when the model is unreachable or its answer does not parse into
    /// `{"fields": [...]}`. Individual bad entries are dropped, not fatal.
    pub fn extract(
        &self,
        template: &Template,
        document: &Document,
    ) -> Result<HashMap<String, LlmField>, RemoteExtractionError> {
        let request = self.build_request(template, document);
        let raw = self.transport.complete(&request)?;
        debug!("LLM answered with {} chars", raw.chars().count());

        let json = extract_json(&raw)?;
        let answer: Answer = serde_json::from_value(json)
            .map_err(|e| RemoteExtractionError::Parse(format!("unexpected answer shape: {}", e)))?;

        let mut fields = HashMap::new();
        for entry in answer.fields {
            let name = entry.field_name.clone();
            if fields.contains_key(&name) {
                debug!("{}: ignoring repeated llm answer", name);
                continue;
            }
            if let Some(field) = self.validate(template, document, entry) {
                fields.insert(name, field);
            }
        }

        info!("LLM supplied {} usable field(s) for {}", fields.len(), document.id);
        Ok(fields)
    }

    /// Prompt with the field list and a capped fragment sample.
    pub fn build_request(&self, template: &Template, document: &Document) -> LlmRequest {
        let mut user = String::from("Fields to extract:\n");
        for field in &template.fields {
            let hint = field
                .description
                .clone()
                .unwrap_or_else(|| self.presets.label_for(&field.field_name));
            let _ = writeln!(user, "- {} ({}): {}", field.field_name, field.field_type.as_str(), hint);
        }

        user.push_str("\nDocument fragments as page | [x0, y0, x1, y1] | text:\n");
        let sample = document
            .pages
            .iter()
            .take(self.config.max_pages)
            .flatten()
            .filter(|f| !f.text.trim().is_empty())
            .take(self.config.max_fragments);
        for fragment in sample {
            let text: String = fragment.text.trim().chars().take(self.config.max_fragment_chars).collect();
            let b = &fragment.bbox;
            let _ = writeln!(
                user,
                "{} | [{:.1}, {:.1}, {:.1}, {:.1}] | {}",
                fragment.page_index + 1,
                b.x0,
                b.y0,
                b.x1,
                b.y1,
                text
            );
        }

        user.push_str(
            "\nReturn {\"fields\": [{\"field_name\": str, \"value\": str, \"page_number\": int (1-based), \
             \"bbox\": [x0, y0, x1, y1] or null, \"confidence\": 0..1}]}. Omit fields you cannot find.",
        );

        LlmRequest {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    fn validate(&self, template: &Template, document: &Document, entry: AnswerField) -> Option<LlmField> {
        let name = entry.field_name.as_str();
        let Some(definition) = template.fields.iter().find(|f| f.field_name == name) else {
            debug!("{}: not a template field, ignoring", name);
            return None;
        };

        let page_number = entry.page_number.unwrap_or(1);
        let last_page = document.page_count().max(1) as u32;
        if page_number == 0 || page_number > last_page {
            warn!("{}: llm page {} outside 1..={}, dropping", name, page_number, last_page);
            return None;
        }

        let bbox = match entry.bbox.as_ref().filter(|v| !v.is_null()).map(BBox::from_json) {
            Some(Ok(bbox)) => Some(bbox),
            Some(Err(e)) => {
                warn!("{}: ignoring llm bbox: {}", name, e);
                None
            }
            None => None,
        };

        let value = match entry.value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        if self.presets.is_party(name) && !self.party_supported(name, value.as_deref(), page_number, bbox.as_ref(), document) {
            warn!("{}: llm answer lacks discriminator, dropping", name);
            return None;
        }

        let coordinates = match bbox.as_ref().map(|b| self.normalizer.normalize(b, definition.default_coordinates.as_ref())) {
            Some(Ok(coordinates)) => Some(coordinates),
            Some(Err(e)) => {
                warn!("{}: ignoring llm bbox: {}", name, e);
                None
            }
            None => None,
        };

        Some(LlmField {
            value,
            page_number,
            bbox: coordinates.as_ref().and(bbox),
            confidence: entry
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(self.config.default_confidence)
                .clamp(0.0, 1.0),
            coordinates,
        })
    }

    /// The value itself, or a fragment on the answer's line, carries the
    /// party discriminator.
    fn party_supported(
        &self,
        name: &str,
        value: Option<&str>,
        page_number: u32,
        bbox: Option<&BBox>,
        document: &Document,
    ) -> bool {
        if value.is_some_and(|v| self.presets.satisfies_discriminator(name, v)) {
            return true;
        }
        let (Some(bbox), Some(page)) = (bbox, document.pages.get(page_number as usize - 1)) else {
            return false;
        };
        page.iter()
            .filter(|f| f.bbox.shares_line_with(bbox, self.line_merge_ratio))
            .any(|f| self.presets.satisfies_discriminator(name, &f.text))
    }
}
