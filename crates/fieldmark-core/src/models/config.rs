//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extraction::presets::FieldPreset;

/// Main configuration for the fieldmark pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldmarkConfig {
    /// Coordinate normalization.
    pub normalize: NormalizeConfig,

    /// Keyword/regex matching.
    pub matching: MatchingConfig,

    /// Language-model reconciliation.
    pub llm: LlmConfig,

    /// Overlay persistence.
    pub storage: StorageConfig,

    /// Replacement for the built-in preset table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<FieldPreset>>,
}

/// Source/target resolution used to rescale bounding boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Resolution of layout coordinates (PDF points).
    pub source_dpi: f64,

    /// Resolution of the annotation view.
    pub target_dpi: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            source_dpi: 72.0,
            target_dpi: 96.0,
        }
    }
}

impl NormalizeConfig {
    /// Multiplier from source to target units.
    pub fn scale_factor(&self) -> f64 {
        self.target_dpi / self.source_dpi
    }
}

/// Matching behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Threshold used when a field does not set its own.
    pub default_confidence_threshold: f64,

    /// Floor confidence for keyword hits.
    pub keyword_confidence: f64,

    /// Floor confidence for regex hits.
    pub regex_confidence: f64,

    /// Two fragments share a line when their vertical centers differ by less
    /// than this fraction of the taller fragment's height.
    pub line_merge_ratio: f64,

    /// Line budget for long_text fields without their own config.
    pub default_long_text_lines: usize,

    /// Rescale template default coordinates like fragment coordinates.
    /// Off by default: defaults are drawn in view units.
    pub normalize_template_defaults: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_confidence_threshold: 0.3,
            keyword_confidence: 0.8,
            regex_confidence: 0.8,
            line_merge_ratio: 0.6,
            default_long_text_lines: 5,
            normalize_template_defaults: false,
        }
    }
}

/// Wire shape spoken by the LLM endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProtocol {
    /// `{model, input: {messages}}` → `output.choices[..]`.
    DashScope,
    /// `{model, messages}` → `choices[..]`.
    OpenAi,
}

/// Language-model endpoint and prompt limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Request/response shape.
    pub protocol: LlmProtocol,

    /// Endpoint URL.
    pub endpoint: String,

    /// Model name sent with every request.
    pub model_name: String,

    /// API key. Falls back to the `api_key_env` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Pages included in the prompt sample.
    pub max_pages: usize,

    /// Fragments included in the prompt sample.
    pub max_fragments: usize,

    /// Characters kept per fragment in the prompt.
    pub max_fragment_chars: usize,

    /// Use model-proposed boxes as coordinate overrides instead of only
    /// refining values.
    pub trust_coordinates: bool,

    /// Confidence for model answers that carry none.
    pub default_confidence: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            protocol: LlmProtocol::DashScope,
            endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation"
                .to_string(),
            model_name: "qwen-vl-max".to_string(),
            api_key: None,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            timeout_secs: 60,
            max_pages: 5,
            max_fragments: 200,
            max_fragment_chars: 80,
            trust_coordinates: false,
            default_confidence: 0.9,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Where overlay data is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one overlay file per document.
    pub overlay_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            overlay_dir: PathBuf::from("overlays"),
        }
    }
}

impl FieldmarkConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
