//! Preset keywords, labels and roles for well-known field names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::template::FieldDefinition;

/// Closed set of roles that get regex fallback and cross-role guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Date,
    Identifier,
    Amount,
    /// A contract party; requires a discriminator phrase.
    Party,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Date => "date",
            FieldRole::Identifier => "identifier",
            FieldRole::Amount => "amount",
            FieldRole::Party => "party",
        }
    }
}

/// Defaults for one well-known field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPreset {
    pub field_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<FieldRole>,

    /// For party roles: at least one must appear in the source text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discriminators: Vec<String>,
}

impl FieldPreset {
    fn new(field_name: &str, label: &str, keywords: &[&str], role: Option<FieldRole>) -> Self {
        Self {
            field_name: field_name.to_string(),
            label: Some(label.to_string()),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            role,
            discriminators: Vec::new(),
        }
    }

    fn party(field_name: &str, label: &str, phrases: &[&str]) -> Self {
        let mut preset = Self::new(field_name, label, phrases, Some(FieldRole::Party));
        preset.discriminators = preset.keywords.clone();
        preset
    }
}

/// Immutable lookup table, built once per engine.
#[derive(Debug, Clone)]
pub struct PresetTable {
    presets: HashMap<String, FieldPreset>,
}

impl PresetTable {
    /// Built-in presets for contract templates.
    pub fn builtin() -> Self {
        Self::from_presets(vec![
            FieldPreset::new("contract_name", "合同名称", &["合同名称", "项目名称"], None),
            FieldPreset::new(
                "contract_number",
                "合同编号",
                &["合同编号", "合同号", "编号"],
                Some(FieldRole::Identifier),
            ),
            FieldPreset::new(
                "contract_date",
                "合同日期",
                &["签订日期", "签署日期", "合同日期", "签订时间"],
                Some(FieldRole::Date),
            ),
            FieldPreset::new(
                "contract_amount",
                "合同金额",
                &["合同金额", "合同总价", "总金额", "合同价款"],
                Some(FieldRole::Amount),
            ),
            FieldPreset::party("party_a", "甲方名称", &["甲方"]),
            FieldPreset::party("party_b", "乙方名称", &["乙方"]),
            FieldPreset::party("buyer", "买方", &["买方", "采购方", "需方"]),
            FieldPreset::party("seller", "卖方", &["卖方", "供应商", "供方"]),
            FieldPreset::new("signature", "签章", &["签字", "盖章", "签章"], None),
        ])
    }

    pub fn from_presets(presets: Vec<FieldPreset>) -> Self {
        Self {
            presets: presets
                .into_iter()
                .map(|p| (p.field_name.clone(), p))
                .collect(),
        }
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldPreset> {
        self.presets.get(field_name)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Field keywords, else preset keywords, else the field name.
    pub fn keywords_for(&self, field: &FieldDefinition) -> Vec<String> {
        if let Some(own) = field.own_keywords() {
            return own;
        }
        match self.get(&field.field_name) {
            Some(preset) if !preset.keywords.is_empty() => preset.keywords.clone(),
            _ => vec![field.field_name.clone()],
        }
    }

    /// Preset role, else a role inferred from the name suffix.
    /// Party roles are never inferred.
    pub fn role_for(&self, field_name: &str) -> Option<FieldRole> {
        if let Some(preset) = self.get(field_name) {
            return preset.role;
        }
        let name = field_name.to_lowercase();
        if name == "date" || name.ends_with("_date") || name.contains("日期") {
            Some(FieldRole::Date)
        } else if ["_number", "_no", "_code"].iter().any(|s| name.ends_with(s)) || name.contains("编号") {
            Some(FieldRole::Identifier)
        } else if name == "amount"
            || ["_amount", "_price", "_total"].iter().any(|s| name.ends_with(s))
            || name.contains("金额")
        {
            Some(FieldRole::Amount)
        } else {
            None
        }
    }

    /// Discriminator phrases when the field is a party role.
    pub fn discriminators_for(&self, field_name: &str) -> Option<&[String]> {
        self.get(field_name)
            .filter(|p| p.role == Some(FieldRole::Party) && !p.discriminators.is_empty())
            .map(|p| p.discriminators.as_slice())
    }

    pub fn is_party(&self, field_name: &str) -> bool {
        self.discriminators_for(field_name).is_some()
    }

    /// Whether `text` satisfies the field's discriminator. Always true for
    /// non-party fields.
    pub fn satisfies_discriminator(&self, field_name: &str, text: &str) -> bool {
        match self.discriminators_for(field_name) {
            Some(phrases) => contains_any(text, phrases),
            None => true,
        }
    }

    /// Display label, falling back to the field name.
    pub fn label_for(&self, field_name: &str) -> String {
        self.get(field_name)
            .and_then(|p| p.label.clone())
            .unwrap_or_else(|| field_name.to_string())
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Case-insensitive containment of any phrase.
pub fn contains_any<S: AsRef<str>>(text: &str, phrases: &[S]) -> bool {
    let haystack = text.to_lowercase();
    phrases
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .any(|p| haystack.contains(&p.to_lowercase()))
}
