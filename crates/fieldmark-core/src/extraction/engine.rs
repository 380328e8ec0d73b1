//! Template extraction engine.
//!
//! Runs every field of a template through the [`FieldMatcher`], optionally
//! refines the results with language-model answers, and reports one
//! [`MatchDetail`] per emitted candidate plus one per rejected input.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::matcher::{FieldMatcher, MatchMode};
use super::normalizer::CoordinateNormalizer;
use super::presets::PresetTable;
use crate::error::{FieldmarkError, InputError, Result};
use crate::layout::Document;
use crate::llm::{LlmField, LlmReconciler, LlmTransport};
use crate::models::annotation::{AnnotationRecord, ExtractionResult, MatchDetail};
use crate::models::config::{FieldmarkConfig, LlmConfig, MatchingConfig};
use crate::models::template::{FieldDefinition, Template};
use crate::storage::OverlayStore;

/// How much evidence the engine may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Template defaults only.
    Off,
    /// Keyword and regex matching.
    #[default]
    Matching,
    /// Matching, refined by the language model.
    MatchingLlm,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Off => "off",
            ExtractionMode::Matching => "matching",
            ExtractionMode::MatchingLlm => "matching-llm",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = FieldmarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "matching" => Ok(Self::Matching),
            "matching-llm" | "matching_llm" | "matching+llm" | "llm" => Ok(Self::MatchingLlm),
            _ => Err(FieldmarkError::Config(format!(
                "unknown mode '{}'. Valid options: off, matching, matching-llm",
                s
            ))),
        }
    }
}

/// Results in field-definition order, plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub results: Vec<ExtractionResult>,
    pub details: Vec<MatchDetail>,
}

impl ExtractionOutput {
    pub fn results_for<'a>(&'a self, field_name: &'a str) -> impl Iterator<Item = &'a ExtractionResult> + 'a {
        self.results.iter().filter(move |r| r.field_name == field_name)
    }

    /// Diagnostic notes that do not describe a candidate.
    pub fn notes(&self) -> impl Iterator<Item = &MatchDetail> {
        self.details.iter().filter(|d| !d.is_candidate())
    }
}

/// Stateless between runs; one engine can serve many documents.
pub struct TemplateExtractionEngine {
    matching: MatchingConfig,
    llm_config: LlmConfig,
    presets: PresetTable,
    normalizer: CoordinateNormalizer,
    reconciler: Option<LlmReconciler>,
    llm_unavailable: Option<String>,
    overlay_store: Option<Box<dyn OverlayStore + Send + Sync>>,
}

impl TemplateExtractionEngine {
    pub fn new(config: &FieldmarkConfig) -> Result<Self> {
        let presets = match &config.presets {
            Some(presets) => PresetTable::from_presets(presets.clone()),
            None => PresetTable::builtin(),
        };
        Ok(Self {
            matching: config.matching.clone(),
            llm_config: config.llm.clone(),
            presets,
            normalizer: CoordinateNormalizer::from_config(&config.normalize)?,
            reconciler: None,
            llm_unavailable: None,
            overlay_store: None,
        })
    }

    /// Use `transport` for `matching-llm` runs.
    pub fn with_llm_transport(mut self, transport: Box<dyn LlmTransport + Send + Sync>) -> Self {
        let reconciler = LlmReconciler::new(transport, self.llm_config.clone())
            .with_presets(self.presets.clone())
            .with_normalizer(self.normalizer)
            .with_line_merge_ratio(self.matching.line_merge_ratio);
        self.reconciler = Some(reconciler);
        self.llm_unavailable = None;
        self
    }

    /// Use the configured HTTP endpoint for `matching-llm` runs. A missing
    /// key or endpoint is remembered and reported on each LLM run.
    #[cfg(feature = "llm")]
    pub fn with_http_llm(self) -> Self {
        match crate::llm::HttpTransport::from_config(&self.llm_config) {
            Ok(transport) => self.with_llm_transport(Box::new(transport)),
            Err(e) => {
                warn!("LLM disabled: {}", e);
                Self {
                    llm_unavailable: Some(e.to_string()),
                    ..self
                }
            }
        }
    }

    pub fn with_overlay_store(mut self, store: Box<dyn OverlayStore + Send + Sync>) -> Self {
        self.overlay_store = Some(store);
        self
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn normalizer(&self) -> &CoordinateNormalizer {
        &self.normalizer
    }

    /// Apply `template` to `document`. Never fails: rejected inputs and LLM
    /// trouble are reported in `details`.
    pub fn run(&self, template: &Template, document: &Document, mode: ExtractionMode) -> ExtractionOutput {
        info!(
            "Applying template '{}' ({} fields) to {} in {} mode",
            template.template_name,
            template.fields.len(),
            document.id,
            mode
        );

        let mut details = Vec::new();
        self.persist_overlay(template, document, &mut details);

        for error in template.rejected.iter().chain(&document.rejected) {
            details.push(MatchDetail::note(error.scope(), error.to_string()));
        }

        let fields = self.accepted_fields(template, &mut details);

        let llm_fields = match mode {
            ExtractionMode::MatchingLlm => self.consult_llm(template, document, &mut details),
            _ => HashMap::new(),
        };
        let trust_coordinates = self.llm_config.trust_coordinates;

        let matcher = FieldMatcher::new(&self.presets, &self.normalizer, &self.matching);
        let match_mode = match mode {
            ExtractionMode::Off => MatchMode::Disabled,
            ExtractionMode::Matching | ExtractionMode::MatchingLlm => MatchMode::Scan,
        };

        let mut results = Vec::new();
        for (index, field) in fields {
            let llm = llm_fields.get(&field.field_name);
            let llm_override = llm.filter(|_| trust_coordinates).and_then(LlmField::as_override);
            let llm_value = llm
                .filter(|_| llm_override.is_none())
                .and_then(|l| l.value.clone());

            let candidates = matcher.match_field(field, index, document, match_mode, llm_override.as_ref());
            for mut candidate in candidates {
                if let Some(value) = &llm_value {
                    candidate.value = Some(value.clone());
                    candidate.note.push_str("; value from llm");
                }
                details.push(MatchDetail::for_candidate(&field.field_name, &candidate));
                results.push(ExtractionResult::from_candidate(
                    &field.field_name,
                    field.field_type,
                    candidate,
                ));
            }
        }

        info!("{}: {} result(s), {} detail(s)", document.id, results.len(), details.len());
        ExtractionOutput { results, details }
    }

    /// Annotation records for `output`, labelled from the preset table.
    pub fn annotations(&self, document_id: &str, output: &ExtractionOutput) -> Vec<AnnotationRecord> {
        output
            .results
            .iter()
            .map(|r| AnnotationRecord::from_result(document_id, self.presets.label_for(&r.field_name), r))
            .collect()
    }

    /// Valid, first-seen fields with their template index.
    fn accepted_fields<'t>(
        &self,
        template: &'t Template,
        details: &mut Vec<MatchDetail>,
    ) -> Vec<(usize, &'t FieldDefinition)> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for (index, field) in template.fields.iter().enumerate() {
            let verdict = field.validate().and_then(|_| {
                if seen.insert(field.field_name.as_str()) {
                    Ok(())
                } else {
                    Err(InputError::DuplicateField(field.field_name.clone()))
                }
            });
            match verdict {
                Ok(()) => accepted.push((index, field)),
                Err(e) => {
                    warn!("Rejecting field #{}: {}", index, e);
                    details.push(MatchDetail::note(e.scope(), e.to_string()));
                }
            }
        }

        accepted
    }

    fn consult_llm(
        &self,
        template: &Template,
        document: &Document,
        details: &mut Vec<MatchDetail>,
    ) -> HashMap<String, LlmField> {
        let Some(reconciler) = &self.reconciler else {
            let reason = self
                .llm_unavailable
                .as_deref()
                .unwrap_or("no LLM transport configured");
            warn!("LLM unavailable for {}: {}", document.id, reason);
            details.push(MatchDetail::note(
                "llm",
                format!("llm unavailable ({}); fell back to matching", reason),
            ));
            return HashMap::new();
        };

        match reconciler.extract(template, document) {
            Ok(fields) => {
                debug!("LLM answered for {:?}", fields.keys().collect::<Vec<_>>());
                fields
            }
            Err(e) => {
                warn!("LLM extraction failed for {}: {}", document.id, e);
                details.push(MatchDetail::note(
                    "llm",
                    format!("llm extraction failed ({}); fell back to matching", e),
                ));
                HashMap::new()
            }
        }
    }

    fn persist_overlay(&self, template: &Template, document: &Document, details: &mut Vec<MatchDetail>) {
        let Some(overlay) = &template.paint_data else {
            return;
        };
        let Some(store) = &self.overlay_store else {
            debug!("No overlay store configured, overlay for {} not persisted", document.id);
            return;
        };
        if let Err(e) = store.save(&document.id, overlay) {
            warn!("Overlay for {} not persisted: {}", document.id, e);
            details.push(MatchDetail::note("overlay", e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteExtractionError;
    use crate::layout::{BBox, TextFragment};
    use crate::llm::LlmRequest;
    use crate::models::annotation::Strategy;
    use crate::models::template::FieldType;
    use crate::storage::MemoryOverlayStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    struct Canned(std::result::Result<String, ()>);

    impl LlmTransport for Canned {
        fn complete(&self, _request: &LlmRequest) -> std::result::Result<String, RemoteExtractionError> {
            self.0
                .clone()
                .map_err(|_| RemoteExtractionError::Timeout(60))
        }
    }

    struct SharedStore(Arc<MemoryOverlayStore>);

    impl OverlayStore for SharedStore {
        fn save(&self, id: &str, overlay: &serde_json::Value) -> std::result::Result<(), crate::error::StorageError> {
            self.0.save(id, overlay)
        }

        fn load(&self, id: &str) -> std::result::Result<Option<serde_json::Value>, crate::error::StorageError> {
            self.0.load(id)
        }
    }

    fn engine() -> TemplateExtractionEngine {
        TemplateExtractionEngine::new(&FieldmarkConfig::default()).unwrap()
    }

    fn document() -> Document {
        Document::new(
            "doc",
            vec![vec![
                TextFragment::new(0, BBox::new(50.0, 100.0, 200.0, 112.0), "合同编号：HT-001"),
                TextFragment::new(0, BBox::new(50.0, 130.0, 200.0, 142.0), "签订日期：2023-08-10"),
            ]],
        )
    }

    fn template() -> Template {
        Template::new(
            "contract",
            vec![
                FieldDefinition::new("contract_number", FieldType::Text),
                FieldDefinition::new("contract_date", FieldType::Text),
                FieldDefinition::new("party_b", FieldType::Text),
            ],
        )
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("off".parse::<ExtractionMode>().unwrap(), ExtractionMode::Off);
        assert_eq!("matching+llm".parse::<ExtractionMode>().unwrap(), ExtractionMode::MatchingLlm);
        assert!("fuzzy".parse::<ExtractionMode>().is_err());
    }

    #[test]
    fn test_off_mode_one_result_per_field() {
        let output = engine().run(&template(), &document(), ExtractionMode::Off);

        assert_eq!(output.results.len(), 3);
        assert!(output.results.iter().all(|r| r.strategy == Strategy::TemplateCoordinates));
        assert_eq!(output.details.len(), 3);
    }

    #[test]
    fn test_matching_preserves_field_order() {
        let output = engine().run(&template(), &document(), ExtractionMode::Matching);

        let names: Vec<&str> = output.results.iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["contract_number", "contract_date"]);
        assert_eq!(output.results[0].value.as_deref(), Some("HT-001"));
        assert_eq!(output.results[1].value.as_deref(), Some("2023-08-10"));
    }

    #[test]
    fn test_invalid_and_duplicate_fields_are_noted() {
        let mut template = template();
        template.fields.push(FieldDefinition::new("contract_number", FieldType::Text));
        template.fields.push(FieldDefinition::new("bad", FieldType::Text).with_threshold(2.0));

        let output = engine().run(&template, &document(), ExtractionMode::Off);
        assert_eq!(output.results.len(), 3);
        let notes: Vec<&MatchDetail> = output.notes().collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].field_name, "contract_number");
        assert_eq!(notes[1].field_name, "bad");
    }

    #[test]
    fn test_llm_failure_falls_back_with_note() {
        let engine = engine().with_llm_transport(Box::new(Canned(Err(()))));

        let with_llm = engine.run(&template(), &document(), ExtractionMode::MatchingLlm);
        let plain = engine.run(&template(), &document(), ExtractionMode::Matching);

        assert_eq!(with_llm.results, plain.results);
        let notes: Vec<&MatchDetail> = with_llm.notes().collect();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].note.contains("fell back to matching"));
    }

    #[test]
    fn test_llm_value_substitution_keeps_coordinates() {
        let answer = r#"{"fields": [{"field_name": "contract_number", "value": "HT-001-A", "page_number": 1, "bbox": [0, 0, 10, 10]}]}"#;
        let engine = engine().with_llm_transport(Box::new(Canned(Ok(answer.to_string()))));

        let plain = engine.run(&template(), &document(), ExtractionMode::Matching);
        let refined = engine.run(&template(), &document(), ExtractionMode::MatchingLlm);

        assert_eq!(refined.results[0].value.as_deref(), Some("HT-001-A"));
        assert_eq!(refined.results[0].coordinates, plain.results[0].coordinates);
        assert_eq!(refined.results[0].strategy, Strategy::KeywordOffset);
        assert_eq!(refined.results[0].confidence, plain.results[0].confidence);
        assert!(refined.details[0].note.ends_with("value from llm"));
        assert_eq!(refined.results[1], plain.results[1]);
    }

    #[test]
    fn test_trusted_llm_coordinates_override() {
        let config = FieldmarkConfig {
            llm: LlmConfig {
                trust_coordinates: true,
                ..LlmConfig::default()
            },
            ..FieldmarkConfig::default()
        };
        let answer = r#"{"fields": [
            {"field_name": "contract_number", "value": "HT-001", "page_number": 1, "bbox": [72, 72, 144, 84], "confidence": 0.7},
            {"field_name": "contract_date", "value": "2023年8月10日", "page_number": 1}
        ]}"#;
        let engine = TemplateExtractionEngine::new(&config)
            .unwrap()
            .with_llm_transport(Box::new(Canned(Ok(answer.to_string()))));

        let output = engine.run(&template(), &document(), ExtractionMode::MatchingLlm);
        assert_eq!(output.results[0].strategy, Strategy::Llm);
        assert_eq!(output.results[0].confidence, 0.7);
        assert_eq!(output.results[0].coordinates.x, 96.0);
        // No box: value substitution only.
        assert_eq!(output.results[1].strategy, Strategy::KeywordOffset);
        assert_eq!(output.results[1].value.as_deref(), Some("2023年8月10日"));
    }

    #[test]
    fn test_missing_transport_is_noted() {
        let output = engine().run(&template(), &document(), ExtractionMode::MatchingLlm);
        assert!(output.notes().any(|d| d.field_name == "llm"));
        assert_eq!(output.results.len(), 2);
    }

    #[test]
    fn test_overlay_persisted_per_document() {
        let store = Arc::new(MemoryOverlayStore::new());
        let engine = engine().with_overlay_store(Box::new(SharedStore(store.clone())));
        let template = template().with_paint_data(json!({"strokes": [[1, 2, 3]]}));

        engine.run(&template, &document(), ExtractionMode::Off);
        assert_eq!(store.load("doc").unwrap(), Some(json!({"strokes": [[1, 2, 3]]})));
    }

    #[test]
    fn test_annotations_carry_labels() {
        let engine = engine();
        let output = engine.run(&template(), &document(), ExtractionMode::Matching);
        let records = engine.annotations("doc", &output);

        assert_eq!(records[0].label, "合同编号");
        assert_eq!(records[1].label, "合同日期");
        assert_eq!(records[0].field_value.as_deref(), Some("HT-001"));
    }
}
