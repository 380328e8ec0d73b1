//! Template and field definition models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FieldmarkError, InputError};

/// Kind of content a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Single-line value following a label.
    #[default]
    Text,
    /// Multi-line paragraph following a label.
    LongText,
    /// Image placeholder (signature, stamp).
    Image,
    /// Table placeholder.
    Table,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::LongText => "long_text",
            FieldType::Image => "image",
            FieldType::Table => "table",
        }
    }
}

/// Annotation rectangle plus display style, in view units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fontSize")]
    pub font_size: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fontColor")]
    pub font_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fontFamily")]
    pub font_family: Option<String>,
}

impl Coordinates {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }

    /// Copy font attributes from another block.
    pub fn with_style_of(mut self, other: &Coordinates) -> Self {
        self.font_size = other.font_size;
        self.font_color = other.font_color.clone();
        self.font_family = other.font_family.clone();
        self
    }

    /// Check that every numeric component is finite.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .chain(self.font_size.iter())
            .all(|v| v.is_finite())
    }

    /// Placement used when a template gives no coordinates for a field.
    pub fn default_for_index(index: usize) -> Self {
        Self::new(60.0, 60.0 + index as f64 * 50.0, 180.0, 36.0)
    }
}

/// Offset applied to a matched anchor's top-left corner, in source units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorOffset {
    #[serde(default, alias = "x")]
    pub dx: f64,
    #[serde(default, alias = "y")]
    pub dy: f64,
}

/// Configuration for long_text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTextConfig {
    /// Maximum number of lines gathered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,

    /// Gathering stops at a fragment containing any of these.
    #[serde(default)]
    pub end_keywords: Vec<String>,
}

/// One named field of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Unique within the template.
    pub field_name: String,

    #[serde(default)]
    pub field_type: FieldType,

    /// Case-insensitive anchor words, tried in order. Falls back to the
    /// preset table, then to the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,

    /// Advisory page (1-based); scanning always covers every page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_hint: Option<u32>,

    /// Page used for template-coordinate placement (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    #[serde(default)]
    pub anchor_offset: AnchorOffset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_text: Option<LongTextConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "coordinates")]
    pub default_coordinates: Option<Coordinates>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "field_value")]
    pub default_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,
}

impl FieldDefinition {
    /// Create a field with no keywords, offsets or defaults.
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            keywords: None,
            page_hint: None,
            page_number: None,
            anchor_offset: AnchorOffset::default(),
            confidence_threshold: None,
            long_text: None,
            default_coordinates: None,
            default_value: None,
            description: None,
            required: false,
        }
    }

    pub fn with_keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_anchor_offset(mut self, dx: f64, dy: f64) -> Self {
        self.anchor_offset = AnchorOffset { dx, dy };
        self
    }

    pub fn with_long_text(mut self, max_lines: usize, end_keywords: &[&str]) -> Self {
        self.long_text = Some(LongTextConfig {
            max_lines: Some(max_lines),
            end_keywords: end_keywords.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_default_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.default_coordinates = Some(coordinates);
        self
    }

    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_page_hint(mut self, page: u32) -> Self {
        self.page_hint = Some(page);
        self
    }

    /// Keywords configured on the field itself, ignoring blanks.
    pub fn own_keywords(&self) -> Option<Vec<String>> {
        let keywords: Vec<String> = self
            .keywords
            .as_ref()?
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        (!keywords.is_empty()).then_some(keywords)
    }

    /// Validate values serde cannot check.
    pub fn validate(&self) -> Result<(), InputError> {
        let invalid = |reason: &str| InputError::InvalidField {
            field: self.field_name.clone(),
            reason: reason.to_string(),
        };

        if self.field_name.trim().is_empty() {
            return Err(invalid("field_name is empty"));
        }
        if let Some(threshold) = self.confidence_threshold {
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(invalid("confidence_threshold must be within [0, 1]"));
            }
        }
        if !self.anchor_offset.dx.is_finite() || !self.anchor_offset.dy.is_finite() {
            return Err(invalid("anchor_offset must be finite"));
        }
        if self.page_hint == Some(0) || self.page_number == Some(0) {
            return Err(invalid("pages are numbered from 1"));
        }
        if let Some(coords) = &self.default_coordinates {
            if !coords.is_finite() {
                return Err(invalid("default_coordinates must be finite"));
            }
        }
        Ok(())
    }
}

/// A reusable set of field definitions plus optional overlay drawing data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub template_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    /// Free-form strokes, persisted verbatim per document.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "overlay")]
    pub paint_data: Option<Value>,

    /// Field entries that failed to parse.
    #[serde(skip)]
    pub rejected: Vec<InputError>,
}

impl Template {
    pub fn new(template_name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            template_name: template_name.into(),
            fields,
            ..Self::default()
        }
    }

    pub fn with_paint_data(mut self, paint_data: Value) -> Self {
        self.paint_data = Some(paint_data);
        self
    }

    /// Parse a template payload, rejecting malformed fields one by one.
    pub fn from_json(text: &str) -> Result<Self, FieldmarkError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: Value) -> Result<Self, FieldmarkError> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| FieldmarkError::Config("template must be a JSON object".to_string()))?;

        // Stored templates nest fields under template_data.
        let raw_fields = match object.remove("fields") {
            Some(fields) => fields,
            None => object
                .get_mut("template_data")
                .and_then(|d| d.as_object_mut())
                .and_then(|d| d.remove("fields"))
                .unwrap_or(Value::Array(Vec::new())),
        };
        let raw_fields = match raw_fields {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            _ => {
                return Err(FieldmarkError::Config(
                    "template fields must be an array".to_string(),
                ));
            }
        };

        let mut template: Template = serde_json::from_value(value)?;

        for (index, raw) in raw_fields.into_iter().enumerate() {
            let name = raw
                .get("field_name")
                .and_then(|n| n.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("field_{}", index + 1));

            match serde_json::from_value::<FieldDefinition>(raw) {
                Ok(field) => template.fields.push(field),
                Err(e) => template.rejected.push(InputError::InvalidField {
                    field: name,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_template_with_aliases() {
        let template = Template::from_json(
            r#"{
                "template_name": "采购合同",
                "document_type": "contract",
                "fields": [
                    {
                        "field_name": "contract_date",
                        "field_type": "text",
                        "keywords": ["签订日期"],
                        "anchor_offset": {"x": 4, "y": -2},
                        "coordinates": {"x": 10, "y": 20, "width": 100, "height": 30, "fontSize": 14}
                    },
                    {"field_name": "party_a", "field_type": "long_text"}
                ],
                "paint_data": [{"type": "free", "points": []}]
            }"#,
        )
        .unwrap();

        assert_eq!(template.fields.len(), 2);
        assert!(template.rejected.is_empty());
        let date = &template.fields[0];
        assert_eq!(date.anchor_offset, AnchorOffset { dx: 4.0, dy: -2.0 });
        assert_eq!(date.default_coordinates.as_ref().unwrap().font_size, Some(14.0));
        assert_eq!(template.fields[1].field_type, FieldType::LongText);
        assert!(template.paint_data.is_some());
    }

    #[test]
    fn test_malformed_field_rejected_alone() {
        let template = Template::from_json(
            r#"{"fields": [
                {"field_name": "contract_number", "field_type": "barcode"},
                {"field_name": "contract_amount"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(template.fields.len(), 1);
        assert_eq!(template.fields[0].field_name, "contract_amount");
        assert_eq!(template.rejected.len(), 1);
        assert_eq!(template.rejected[0].scope(), "contract_number");
    }

    #[test]
    fn test_nested_template_data() {
        let template = Template::from_json(
            r#"{"template_name": "t", "template_data": {"fields": [{"field_name": "a"}]}}"#,
        )
        .unwrap();
        assert_eq!(template.fields.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let field = FieldDefinition::new("contract_date", FieldType::Text).with_threshold(1.5);
        assert!(field.validate().is_err());

        let field = FieldDefinition::new("contract_date", FieldType::Text).with_threshold(0.5);
        assert!(field.validate().is_ok());

        let field = FieldDefinition::new("  ", FieldType::Text);
        assert!(field.validate().is_err());
    }

    #[test]
    fn test_own_keywords_ignores_blanks() {
        let field = FieldDefinition::new("x", FieldType::Text).with_keywords(["", "  "]);
        assert_eq!(field.own_keywords(), None);

        let field = FieldDefinition::new("x", FieldType::Text).with_keywords([" 编号 "]);
        assert_eq!(field.own_keywords(), Some(vec!["编号".to_string()]));
    }
}
