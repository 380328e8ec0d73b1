//! Common regex patterns for contract field heuristics.
//!
//! Chinese characters count as word characters for `\b`, so boundaries are
//! checked by the extractors instead of inside the patterns.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // 2024年5月1日, 2024 年 05 月 01 日
    pub static ref DATE_CN: Regex = Regex::new(
        r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日"
    ).unwrap();

    // 2024-05-01, 2024/5/1, 2024.05.01
    pub static ref DATE_YMD: Regex = Regex::new(
        r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})"
    ).unwrap();

    // ¥30,000.00, 人民币 12000 元, 5.5万元, 1,200,000
    pub static ref AMOUNT: Regex = Regex::new(
        r"(?:¥|￥|\$|RMB|CNY|人民币)\s*\d[\d,]*(?:\.\d+)?(?:\s*(?:万元|元))?|\d[\d,]*(?:\.\d+)?\s*(?:万元|元)|\d{1,3}(?:,\d{3})+(?:\.\d+)?"
    ).unwrap();

    pub static ref CURRENCY_MARKER: Regex = Regex::new(
        r"¥|￥|\$|RMB|CNY|人民币|元"
    ).unwrap();

    // HT-2024-001, ABC001, No.2024/17 (the "No." part is not captured)
    pub static ref IDENTIFIER: Regex = Regex::new(
        r"[A-Za-z0-9]+(?:[-_/][A-Za-z0-9]+)*"
    ).unwrap();

    pub static ref PARTY_NAME: Regex = Regex::new(
        r"[\p{Han}A-Za-z0-9（）()]{2,40}?(?:有限责任公司|股份有限公司|有限公司|公司|集团|研究院|中心|事务所)"
    ).unwrap();

    pub static ref DATE_CHARS: Regex = Regex::new(r"[年月日]").unwrap();
}
