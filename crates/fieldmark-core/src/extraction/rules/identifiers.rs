//! Document number / identifier extraction.

use super::patterns::IDENTIFIER;
use super::{ExtractionMatch, FieldExtractor, looks_like_amount, looks_like_date};

const MIN_LEN: usize = 4;

/// Identifier extractor: alphanumeric runs joined by `-`, `_` or `/`.
///
/// A run must mix letters and digits, or be digits with at least one
/// separator. Dates and amounts never qualify.
pub struct IdentifierExtractor;

impl IdentifierExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_identifier(candidate: &str) -> bool {
        let has_digit = candidate.chars().any(|c| c.is_ascii_digit());
        let has_alpha = candidate.chars().any(|c| c.is_ascii_alphabetic());
        let has_separator = candidate.contains(['-', '_', '/']);
        candidate.len() >= MIN_LEN && has_digit && (has_alpha || has_separator)
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for IdentifierExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        IDENTIFIER
            .find_iter(text)
            .filter(|m| Self::is_identifier(m.as_str()))
            .filter(|m| {
                !looks_like_date(text, m.start(), m.end()) && !looks_like_amount(text, m.start(), m.end())
            })
            .map(|m| {
                ExtractionMatch::new(m.as_str().to_string(), 0.8, m.as_str())
                    .with_position(m.start(), m.end())
            })
            .collect()
    }
}
