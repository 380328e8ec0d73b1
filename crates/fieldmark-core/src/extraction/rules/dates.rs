//! Calendar date extraction.

use chrono::NaiveDate;

use super::patterns::{DATE_CN, DATE_YMD};
use super::{ExtractionMatch, FieldExtractor, digit_bounded, looks_like_amount};

/// Date field extractor. Values are validated calendar dates.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        // 2024年5月1日
        for caps in DATE_CN.captures_iter(text) {
            let Some(full_match) = caps.get(0) else { continue };
            let (start, end) = (full_match.start(), full_match.end());
            if !digit_bounded(text, start, end) {
                continue;
            }
            if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
                results.push(
                    ExtractionMatch::new(date, 0.95, full_match.as_str()).with_position(start, end),
                );
            }
        }

        // 2024-05-01, 2024/05/01, 2024.05.01
        for caps in DATE_YMD.captures_iter(text) {
            let Some(full_match) = caps.get(0) else { continue };
            let (start, end) = (full_match.start(), full_match.end());
            if !digit_bounded(text, start, end) || looks_like_amount(text, start, end) {
                continue;
            }
            if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
                results.push(
                    ExtractionMatch::new(date, 0.9, full_match.as_str()).with_position(start, end),
                );
            }
        }

        results.sort_by_key(|m| m.position);
        results
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_date_chinese() {
        let extractor = DateExtractor::new();

        let result = extractor.extract("签订日期：2024年5月1日").unwrap();
        assert_eq!(result.value, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(result.source, "2024年5月1日");
    }

    #[test]
    fn test_extract_date_ymd() {
        let extractor = DateExtractor::new();

        for text in ["2023-08-10", "2023/8/10", "2023.08.10"] {
            let result = extractor.extract(text).unwrap();
            assert_eq!(result.value, NaiveDate::from_ymd_opt(2023, 8, 10).unwrap());
        }
    }

    #[test]
    fn test_invalid_date_rejected() {
        let extractor = DateExtractor::new();

        assert!(extractor.extract("2024-13-01").is_none());
        assert!(extractor.extract("2023年2月30日").is_none());
    }

    #[test]
    fn test_date_inside_longer_number_rejected() {
        let extractor = DateExtractor::new();

        assert!(extractor.extract("电话 02024-01-019").is_none());
    }

    #[test]
    fn test_chinese_date_needs_clean_leading_edge() {
        let extractor = DateExtractor::new();

        assert!(extractor.extract("电话12024年5月1日").is_none());

        let result = extractor.extract("于2024年5月1日").unwrap();
        assert_eq!(result.source, "2024年5月1日");
        assert_eq!(result.position, Some((3, 18)));
    }

    #[test]
    fn test_money_is_not_a_date() {
        let extractor = DateExtractor::new();

        assert!(extractor.extract("¥30,000.00").is_none());
        assert!(extractor.extract("￥2024.10.50元").is_none());
    }

    #[test]
    fn test_extract_all_in_text_order() {
        let extractor = DateExtractor::new();

        let all = extractor.extract_all("自2024-01-01起至2024年12月31日止");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, "2024-01-01");
        assert_eq!(all[1].source, "2024年12月31日");
    }
}
