//! Field matcher.
//!
//! Locates one field in a document, in priority order:
//!
//! 1. a validated LLM override, if one is supplied (terminal);
//! 2. template defaults, when matching is disabled;
//! 3. keyword anchors, scanning every fragment of every page;
//! 4. a role-specific regex over fragments without a keyword, when step 3
//!    found nothing;
//! 5. template defaults again, except for party fields which stay empty.

use regex::{Regex, RegexBuilder};
use tracing::{debug, trace, warn};

use super::normalizer::CoordinateNormalizer;
use super::presets::{FieldRole, PresetTable, contains_any};
use super::rules::extract_role_value;
use crate::layout::{Document, TextFragment};
use crate::models::annotation::{MatchCandidate, Strategy};
use crate::models::config::MatchingConfig;
use crate::models::template::{Coordinates, FieldDefinition, FieldType};

/// Stripped between a keyword and its value.
const LEADING_PUNCTUATION: &[char] = &[
    ':', '：', ',', '，', ';', '；', '、', '.', '。', '-', '—', '_', ')', '）',
];

/// Whether the matcher may look at the document at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Template defaults only.
    Disabled,
    /// Keyword scan, then regex fallback.
    Scan,
}

/// A validated LLM answer threaded through as the field's location.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOverride {
    /// Already in target space.
    pub coordinates: Coordinates,
    pub page_number: u32,
    pub value: Option<String>,
    pub confidence: f64,
}

/// Produces match candidates for one field at a time.
pub struct FieldMatcher<'a> {
    presets: &'a PresetTable,
    normalizer: &'a CoordinateNormalizer,
    config: &'a MatchingConfig,
}

impl<'a> FieldMatcher<'a> {
    pub fn new(
        presets: &'a PresetTable,
        normalizer: &'a CoordinateNormalizer,
        config: &'a MatchingConfig,
    ) -> Self {
        Self {
            presets,
            normalizer,
            config,
        }
    }

    /// Effective confidence threshold of a field.
    pub fn threshold(&self, field: &FieldDefinition) -> f64 {
        field
            .confidence_threshold
            .unwrap_or(self.config.default_confidence_threshold)
            .clamp(0.0, 1.0)
    }

    /// Candidates for `field`, the `index`-th field of its template.
    pub fn match_field(
        &self,
        field: &FieldDefinition,
        index: usize,
        document: &Document,
        mode: MatchMode,
        llm_override: Option<&LlmOverride>,
    ) -> Vec<MatchCandidate> {
        if let Some(llm) = llm_override {
            debug!("{}: using llm override on page {}", field.field_name, llm.page_number);
            return vec![MatchCandidate {
                coordinates: llm.coordinates.clone(),
                page_number: document.clamp_page(llm.page_number),
                confidence: llm.confidence.clamp(0.0, 1.0),
                strategy: Strategy::Llm,
                note: "llm override".to_string(),
                value: llm.value.clone(),
            }];
        }

        if mode == MatchMode::Disabled {
            return vec![self.template_candidate(field, index, document, "template defaults")];
        }

        let keywords = compile_keywords(&self.presets.keywords_for(field));
        let mut candidates = self.keyword_scan(field, &keywords, document);

        if candidates.is_empty() {
            if let Some(role) = self.presets.role_for(&field.field_name) {
                candidates = self.regex_scan(field, role, &keywords, document);
            }
        }

        if candidates.is_empty() {
            if self.presets.is_party(&field.field_name) {
                debug!("{}: no discriminated hit, reporting absent", field.field_name);
            } else {
                candidates.push(self.template_candidate(
                    field,
                    index,
                    document,
                    "unmatched fallback: no keyword or regex hit",
                ));
            }
        }

        debug!("{}: {} candidate(s)", field.field_name, candidates.len());
        candidates
    }

    fn keyword_scan(
        &self,
        field: &FieldDefinition,
        keywords: &[Regex],
        document: &Document,
    ) -> Vec<MatchCandidate> {
        let mut candidates = Vec::new();
        let confidence = self.threshold(field).max(self.config.keyword_confidence);

        for (page_index, fragments) in document.pages.iter().enumerate() {
            for (i, fragment) in fragments.iter().enumerate() {
                let Some(keyword) = keywords.iter().find(|re| re.is_match(&fragment.text)) else {
                    continue;
                };

                let (hit, rest) = match fragments.get(i + 1) {
                    Some(next) if fragment.bbox.shares_line_with(&next.bbox, self.config.line_merge_ratio) => {
                        (fragment.merged_with(next), i + 2)
                    }
                    _ => (fragment.clone(), i + 1),
                };
                trace!("{}: keyword hit in {:?}", field.field_name, hit.text);

                if !self.presets.satisfies_discriminator(&field.field_name, &hit.text) {
                    debug!(
                        "{}: discarding hit on page {} without discriminator",
                        field.field_name,
                        page_index + 1
                    );
                    continue;
                }

                let value = self.extract_value(field, keyword, &hit, &fragments[rest..]);
                let anchor = hit.bbox.translate(field.anchor_offset.dx, field.anchor_offset.dy);
                let coordinates = match self.normalizer.normalize(&anchor, field.default_coordinates.as_ref()) {
                    Ok(coordinates) => coordinates,
                    Err(e) => {
                        warn!("{}: skipping hit: {}", field.field_name, e);
                        continue;
                    }
                };

                candidates.push(MatchCandidate {
                    coordinates,
                    page_number: page_index as u32 + 1,
                    confidence,
                    strategy: Strategy::KeywordOffset,
                    note: format!("keyword '{}' on page {}", keyword.as_str(), page_index + 1),
                    value,
                });
            }
        }

        candidates
    }

    fn regex_scan(
        &self,
        field: &FieldDefinition,
        role: FieldRole,
        keywords: &[Regex],
        document: &Document,
    ) -> Vec<MatchCandidate> {
        let mut candidates = Vec::new();
        let confidence = self.threshold(field).max(self.config.regex_confidence);

        for (page_index, fragments) in document.pages.iter().enumerate() {
            for fragment in fragments {
                if keywords.iter().any(|re| re.is_match(&fragment.text)) {
                    continue;
                }
                let Some(found) = extract_role_value(role, &fragment.text) else {
                    continue;
                };
                if !self.line_satisfies_discriminator(&field.field_name, fragment, fragments) {
                    debug!("{}: discarding {} pattern without discriminator", field.field_name, role.as_str());
                    continue;
                }

                let coordinates = match self.normalizer.normalize(&fragment.bbox, field.default_coordinates.as_ref()) {
                    Ok(coordinates) => coordinates,
                    Err(e) => {
                        warn!("{}: skipping hit: {}", field.field_name, e);
                        continue;
                    }
                };

                candidates.push(MatchCandidate {
                    coordinates,
                    page_number: page_index as u32 + 1,
                    confidence,
                    strategy: Strategy::Regex,
                    note: format!("{} pattern on page {}", role.as_str(), page_index + 1),
                    value: Some(found.value),
                });
            }
        }

        candidates
    }

    /// The fragment, or another on its visual line, carries the discriminator.
    fn line_satisfies_discriminator(&self, field_name: &str, fragment: &TextFragment, page: &[TextFragment]) -> bool {
        page.iter()
            .filter(|other| other.bbox.shares_line_with(&fragment.bbox, self.config.line_merge_ratio))
            .any(|other| self.presets.satisfies_discriminator(field_name, &other.text))
    }

    fn extract_value(
        &self,
        field: &FieldDefinition,
        keyword: &Regex,
        hit: &TextFragment,
        following: &[TextFragment],
    ) -> Option<String> {
        match field.field_type {
            FieldType::Text => remainder_after(keyword, &hit.text),
            FieldType::LongText => self.gather_long_text(field, keyword, hit, following),
            FieldType::Image | FieldType::Table => field.default_value.clone(),
        }
    }

    fn gather_long_text(
        &self,
        field: &FieldDefinition,
        keyword: &Regex,
        hit: &TextFragment,
        following: &[TextFragment],
    ) -> Option<String> {
        let (max_lines, end_keywords) = match &field.long_text {
            Some(cfg) => (
                cfg.max_lines.unwrap_or(self.config.default_long_text_lines),
                cfg.end_keywords.as_slice(),
            ),
            None => (self.config.default_long_text_lines, &[][..]),
        };

        let mut lines: Vec<String> = remainder_after(keyword, &hit.text).into_iter().collect();
        for fragment in following.iter().take(max_lines) {
            if contains_any(&fragment.text, end_keywords) {
                break;
            }
            let line = fragment.text.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn template_candidate(
        &self,
        field: &FieldDefinition,
        index: usize,
        document: &Document,
        note: &str,
    ) -> MatchCandidate {
        let defaults = field
            .default_coordinates
            .clone()
            .unwrap_or_else(|| Coordinates::default_for_index(index));
        let coordinates = if self.config.normalize_template_defaults {
            self.normalizer.normalize_coordinates(&defaults)
        } else {
            defaults
        };

        MatchCandidate {
            coordinates,
            page_number: document.clamp_page(field.page_number.or(field.page_hint).unwrap_or(1)),
            confidence: self.threshold(field),
            strategy: Strategy::TemplateCoordinates,
            note: note.to_string(),
            value: Some(field.default_value.clone().unwrap_or_default()),
        }
    }
}

/// Case-insensitive literal matchers, in keyword order.
fn compile_keywords(keywords: &[String]) -> Vec<Regex> {
    keywords
        .iter()
        .filter_map(|kw| {
            RegexBuilder::new(&regex::escape(kw))
                .case_insensitive(true)
                .build()
                .map_err(|e| warn!("Ignoring keyword {:?}: {}", kw, e))
                .ok()
        })
        .collect()
}

/// Text after the keyword, minus leading whitespace and punctuation.
fn remainder_after(keyword: &Regex, text: &str) -> Option<String> {
    let m = keyword.find(text)?;
    let rest = text[m.end()..]
        .trim_start_matches(|c: char| c.is_whitespace() || LEADING_PUNCTUATION.contains(&c))
        .trim_end();
    (!rest.is_empty()).then(|| rest.to_string())
}
