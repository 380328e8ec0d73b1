//! Text-layout providers.
//!
//! A provider turns a document source into pages of `(text, bbox)` pairs.
//! Whether the fragments come from a digital text layer or from OCR is the
//! provider's business; the engine only sees the resolved list.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Document;
use crate::error::LayoutError;

/// Fragment as handed over by a provider, before box validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFragment {
    pub text: String,
    pub bbox: Value,
}

impl RawFragment {
    pub fn new(text: impl Into<String>, bbox: Value) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Source of per-page text fragments.
pub trait TextLayoutProvider {
    /// Read every page of the document at `source`.
    fn get_pages(&self, source: &Path) -> Result<Vec<Vec<RawFragment>>, LayoutError>;

    /// Identity used for per-document storage. Defaults to the file stem.
    fn document_id(&self, source: &Path) -> String {
        source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    }

    /// Read and validate a document. Fails with [`LayoutError::NoText`] when
    /// no page carries text, which callers treat as "force OCR upstream".
    fn load(&self, source: &Path) -> Result<Document, LayoutError> {
        let pages = self.get_pages(source)?;
        let document = Document::from_raw(self.document_id(source), pages);
        if !document.has_text() {
            return Err(LayoutError::NoText);
        }
        Ok(document)
    }
}

/// Reads layouts serialized as JSON.
///
/// Accepted shapes:
/// - `[[{"text": "..", "bbox": [x0, y0, x1, y1]}, ..], ..]`
/// - `{"document_id": "..", "pages": <the above>}`
///
/// A fragment may also be written as a `["text", [x0, y0, x1, y1]]` pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLayoutProvider;

impl JsonLayoutProvider {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, source: &Path) -> Result<Value, LayoutError> {
        let content = std::fs::read_to_string(source)
            .map_err(|e| LayoutError::Read(format!("{}: {}", source.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| LayoutError::Format(e.to_string()))
    }

    /// Parse an in-memory layout value.
    pub fn parse_pages(value: &Value) -> Result<Vec<Vec<RawFragment>>, LayoutError> {
        let pages = match value {
            Value::Array(pages) => pages,
            Value::Object(obj) => obj
                .get("pages")
                .and_then(Value::as_array)
                .ok_or_else(|| LayoutError::Format("missing \"pages\" array".to_string()))?,
            _ => return Err(LayoutError::Format("expected array or object".to_string())),
        };

        pages
            .iter()
            .enumerate()
            .map(|(page_index, page)| -> Result<Vec<RawFragment>, LayoutError> {
                let items = page.as_array().ok_or_else(|| {
                    LayoutError::Format(format!("page {} is not an array", page_index))
                })?;
                Ok(items.iter().map(parse_fragment).collect())
            })
            .collect()
    }
}

/// Lenient fragment reader: shape problems surface later as rejected bboxes.
fn parse_fragment(item: &Value) -> RawFragment {
    match item {
        Value::Object(obj) => RawFragment {
            text: obj
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            bbox: obj.get("bbox").cloned().unwrap_or(Value::Null),
        },
        Value::Array(pair) if pair.len() == 2 => RawFragment {
            text: pair[0].as_str().unwrap_or_default().to_string(),
            bbox: pair[1].clone(),
        },
        other => RawFragment {
            text: String::new(),
            bbox: other.clone(),
        },
    }
}

impl TextLayoutProvider for JsonLayoutProvider {
    fn get_pages(&self, source: &Path) -> Result<Vec<Vec<RawFragment>>, LayoutError> {
        let value = self.read(source)?;
        let pages = Self::parse_pages(&value)?;
        debug!("Read {} layout pages from {}", pages.len(), source.display());
        Ok(pages)
    }

    fn document_id(&self, source: &Path) -> String {
        self.read(source)
            .ok()
            .and_then(|v| v.get("document_id").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                source
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document")
                    .to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pages_both_shapes() {
        let pages = JsonLayoutProvider::parse_pages(&json!([
            [{"text": "甲方：", "bbox": [0, 0, 30, 10]}, ["乙方：", [0, 20, 30, 30]]],
            []
        ]))
        .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0][1].text, "乙方：");
        assert_eq!(pages[0][1].bbox, json!([0, 20, 30, 30]));

        let pages = JsonLayoutProvider::parse_pages(&json!({"pages": [[]]})).unwrap();
        assert_eq!(pages.len(), 1);

        assert!(JsonLayoutProvider::parse_pages(&json!("nope")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(
            &path,
            json!({
                "document_id": "contract-42",
                "pages": [[{"text": "签订日期：2023-08-10", "bbox": [50, 100, 200, 112]}]]
            })
            .to_string(),
        )
        .unwrap();

        let doc = JsonLayoutProvider::new().load(&path).unwrap();
        assert_eq!(doc.id, "contract-42");
        assert_eq!(doc.fragment_count(), 1);
    }

    #[test]
    fn test_load_without_text_signals_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, "[[], [{\"text\": \"  \", \"bbox\": [0,0,1,1]}]]").unwrap();

        let err = JsonLayoutProvider::new().load(&path).unwrap_err();
        assert!(matches!(err, LayoutError::NoText));
    }
}
