//! Role-specific regex heuristics used by the matcher's fallback pass.

pub mod amounts;
pub mod dates;
pub mod identifiers;
pub mod parties;
pub mod patterns;

pub use amounts::{AmountExtractor, parse_amount};
pub use dates::DateExtractor;
pub use identifiers::IdentifierExtractor;
pub use parties::PartyNameExtractor;

use super::presets::FieldRole;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the first occurrence from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences, in text order.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A regex hit with its parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    pub value: T,
    /// 0.0 - 1.0.
    pub confidence: f64,
    /// Byte range in the source text.
    pub position: Option<(usize, usize)>,
    /// Matched text, verbatim.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}

/// First value of `role` in `text`, as the verbatim matched string.
pub fn extract_role_value(role: FieldRole, text: &str) -> Option<ExtractionMatch<String>> {
    fn verbatim<T>(m: ExtractionMatch<T>) -> ExtractionMatch<String> {
        let value = m.source.trim().to_string();
        ExtractionMatch {
            value,
            confidence: m.confidence,
            position: m.position,
            source: m.source,
        }
    }

    match role {
        FieldRole::Date => DateExtractor::new().extract(text).map(verbatim),
        FieldRole::Amount => AmountExtractor::new().extract(text).map(verbatim),
        FieldRole::Identifier => IdentifierExtractor::new().extract(text),
        FieldRole::Party => PartyNameExtractor::new().extract(text),
    }
}

/// Whether `[start, end)` overlaps any match of `spans`.
fn overlaps_any(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

/// Spans in `text` that read as money: a currency marker, a 元 suffix or
/// thousands separators.
pub(crate) fn amount_spans(text: &str) -> Vec<(usize, usize)> {
    patterns::AMOUNT
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Spans in `text` that read as calendar dates.
pub(crate) fn date_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = patterns::DATE_CN
        .find_iter(text)
        .chain(patterns::DATE_YMD.find_iter(text))
        .map(|m| (m.start(), m.end()))
        .collect();
    spans.sort_unstable();
    spans
}

/// Date-shaped text that also reads as money is not a date.
pub(crate) fn looks_like_amount(text: &str, start: usize, end: usize) -> bool {
    overlaps_any(&amount_spans(text), start, end)
}

/// Money-shaped text that also reads as a date is not an amount.
pub(crate) fn looks_like_date(text: &str, start: usize, end: usize) -> bool {
    patterns::DATE_CHARS.is_match(&text[start..end]) || overlaps_any(&date_spans(text), start, end)
}

/// Neither neighbour of `[start, end)` is an ASCII digit.
pub(crate) fn digit_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
}
