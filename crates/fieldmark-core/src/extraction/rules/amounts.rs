//! Monetary amount extraction.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::AMOUNT;
use super::{ExtractionMatch, FieldExtractor, looks_like_date};

/// Amount field extractor.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for m in AMOUNT.find_iter(text) {
            let source = m.as_str().trim();
            if looks_like_date(text, m.start(), m.end()) {
                continue;
            }
            if let Some(amount) = parse_amount(source) {
                results.push(
                    ExtractionMatch::new(amount, 0.85, source).with_position(m.start(), m.end()),
                );
            }
        }

        results
    }
}

/// Parse a formatted amount (e.g. "¥30,000.00", "人民币 12000 元", "5.5万元").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let amount = Decimal::from_str(&cleaned).ok()?;
    if s.contains('万') {
        amount.checked_mul(Decimal::from(10_000))
    } else {
        Some(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("¥30,000.00"), Some(Decimal::from_str("30000.00").unwrap()));
        assert_eq!(parse_amount("人民币 12000 元"), Some(Decimal::from(12000)));
        assert_eq!(parse_amount("5.5万元"), Some(Decimal::from(55000)));
        assert_eq!(parse_amount("元"), None);
    }

    #[test]
    fn test_extract_amount_with_currency() {
        let extractor = AmountExtractor::new();

        let result = extractor.extract("合同总价：¥30,000.00（大写：叁万元整）").unwrap();
        assert_eq!(result.source, "¥30,000.00");
        assert_eq!(result.value, Decimal::from_str("30000.00").unwrap());
    }

    #[test]
    fn test_extract_amount_with_unit_suffix() {
        let extractor = AmountExtractor::new();

        let result = extractor.extract("预付款 8000元").unwrap();
        assert_eq!(result.source, "8000元");
    }

    #[test]
    fn test_plain_numbers_are_not_amounts() {
        let extractor = AmountExtractor::new();

        assert!(extractor.extract("第 3 条 12 款").is_none());
        assert!(extractor.extract("2024年5月1日").is_none());
        assert!(extractor.extract("2024-05-01").is_none());
    }
}
