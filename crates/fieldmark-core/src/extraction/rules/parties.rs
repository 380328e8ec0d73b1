//! Contracting party name extraction.

use super::patterns::PARTY_NAME;
use super::{ExtractionMatch, FieldExtractor};

/// Organisation names ending in a legal-form suffix (有限公司, 集团, ...).
/// Whether the name belongs to a particular party is decided by the caller's
/// discriminator check, not here.
pub struct PartyNameExtractor;

impl PartyNameExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PartyNameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for PartyNameExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        PARTY_NAME
            .find_iter(text)
            .map(|m| {
                ExtractionMatch::new(m.as_str().to_string(), 0.75, m.as_str())
                    .with_position(m.start(), m.end())
            })
            .collect()
    }
}
