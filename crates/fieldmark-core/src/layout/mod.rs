//! Text layout input: fragments with bounding boxes, grouped by page.

mod provider;

pub use provider::{JsonLayoutProvider, RawFragment, TextLayoutProvider};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::InputError;

/// Axis-aligned box (x0, y0, x1, y1) in source units, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build from exactly four finite values, ordering the corners.
    pub fn from_slice(values: &[f64]) -> Result<Self, InputError> {
        let [a, b, c, d] = values else {
            return Err(InputError::InvalidBBox(format!(
                "expected 4 values, got {}",
                values.len()
            )));
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err(InputError::InvalidBBox("non-finite coordinate".to_string()));
        }
        Ok(Self::new(a.min(*c), b.min(*d), a.max(*c), b.max(*d)))
    }

    /// Build from a JSON array of four numbers.
    pub fn from_json(value: &Value) -> Result<Self, InputError> {
        let items = value
            .as_array()
            .ok_or_else(|| InputError::InvalidBBox(format!("not an array: {}", value)))?;
        let numbers = items
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| InputError::InvalidBBox(format!("non-numeric value: {}", v)))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Self::from_slice(&numbers)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn translate(&self, dx: f64, dy: f64) -> BBox {
        BBox::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    /// Vertical centers within `ratio` of the taller box's height.
    pub fn shares_line_with(&self, other: &BBox, ratio: f64) -> bool {
        let tolerance = self.height().max(other.height()) * ratio;
        (self.center_y() - other.center_y()).abs() <= tolerance
    }
}

impl TryFrom<Vec<f64>> for BBox {
    type Error = InputError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// A piece of text with its box, as produced by the layout provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// 0-based.
    pub page_index: usize,
    pub bbox: BBox,
    pub text: String,
}

impl TextFragment {
    pub fn new(page_index: usize, bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            page_index,
            bbox,
            text: text.into(),
        }
    }

    /// Synthetic fragment covering `self` followed by `next` on the same line.
    pub fn merged_with(&self, next: &TextFragment) -> TextFragment {
        TextFragment {
            page_index: self.page_index,
            bbox: self.bbox.union(&next.bbox),
            text: format!("{}{}", self.text.trim_end(), next.text.trim_start()),
        }
    }
}

/// One document's resolved layout.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Identity used to key per-document storage.
    pub id: String,
    pub pages: Vec<Vec<TextFragment>>,
    /// Fragments dropped while reading the layout.
    pub rejected: Vec<InputError>,
}

impl Document {
    pub fn new(id: impl Into<String>, pages: Vec<Vec<TextFragment>>) -> Self {
        Self {
            id: id.into(),
            pages,
            rejected: Vec::new(),
        }
    }

    /// Build from provider output, rejecting malformed fragments one by one.
    pub fn from_raw(id: impl Into<String>, raw_pages: Vec<Vec<RawFragment>>) -> Self {
        let mut rejected = Vec::new();
        let pages = raw_pages
            .into_iter()
            .enumerate()
            .map(|(page_index, raw)| {
                raw.into_iter()
                    .enumerate()
                    .filter_map(|(index, fragment)| match BBox::from_json(&fragment.bbox) {
                        Ok(bbox) => Some(TextFragment::new(page_index, bbox, fragment.text)),
                        Err(e) => {
                            warn!("Dropping fragment {} on page {}: {}", index, page_index, e);
                            rejected.push(InputError::MalformedFragment {
                                page: page_index,
                                index,
                                reason: e.to_string(),
                            });
                            None
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let document = Self {
            id: id.into(),
            pages,
            rejected,
        };
        debug!(
            "Document {} has {} pages, {} fragments ({} rejected)",
            document.id,
            document.page_count(),
            document.fragment_count(),
            document.rejected.len()
        );
        document
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Whether any page carries non-blank text.
    pub fn has_text(&self) -> bool {
        self.pages
            .iter()
            .flatten()
            .any(|f| !f.text.trim().is_empty())
    }

    /// Clamp a 1-based page number into the document.
    pub fn clamp_page(&self, page_number: u32) -> u32 {
        let last = self.page_count().max(1) as u32;
        page_number.clamp(1, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bbox_from_slice_orders_corners() {
        let bbox = BBox::from_slice(&[100.0, 50.0, 10.0, 20.0]).unwrap();
        assert_eq!(bbox, BBox::new(10.0, 20.0, 100.0, 50.0));
        assert!(BBox::from_slice(&[1.0, 2.0, 3.0]).is_err());
        assert!(BBox::from_slice(&[1.0, f64::NAN, 3.0, 4.0]).is_err());
    }

    #[test]
    fn test_bbox_serde_as_array() {
        let bbox: BBox = serde_json::from_value(json!([1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(serde_json::to_value(bbox).unwrap(), json!([1.0, 2.0, 3.0, 4.0]));
        assert!(serde_json::from_value::<BBox>(json!([1.0, 2.0])).is_err());
    }

    #[test]
    fn test_shares_line_with() {
        let label = BBox::new(50.0, 100.0, 110.0, 112.0);
        let value = BBox::new(112.0, 101.0, 200.0, 113.0);
        let below = BBox::new(50.0, 120.0, 110.0, 132.0);

        assert!(label.shares_line_with(&value, 0.6));
        assert!(!label.shares_line_with(&below, 0.6));
    }

    #[test]
    fn test_merged_with_joins_text_and_boxes() {
        let a = TextFragment::new(0, BBox::new(0.0, 0.0, 40.0, 10.0), "合同编号：");
        let b = TextFragment::new(0, BBox::new(42.0, 1.0, 90.0, 11.0), " ABC-001");
        let merged = a.merged_with(&b);
        assert_eq!(merged.text, "合同编号：ABC-001");
        assert_eq!(merged.bbox, BBox::new(0.0, 0.0, 90.0, 11.0));
    }

    #[test]
    fn test_from_raw_rejects_malformed_fragments() {
        let raw = vec![
            vec![
                RawFragment::new("ok", json!([0, 0, 10, 10])),
                RawFragment::new("short", json!([0, 0, 10])),
                RawFragment::new("text", json!(["a", 0, 10, 10])),
            ],
            vec![],
        ];
        let doc = Document::from_raw("doc-1", raw);

        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.fragment_count(), 1);
        assert_eq!(doc.rejected.len(), 2);
        assert!(doc.has_text());
        assert_eq!(doc.clamp_page(9), 2);
        assert_eq!(doc.clamp_page(0), 1);
    }
}
