//! Subcommands.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::debug;

use fieldmark_core::models::config::FieldmarkConfig;
use fieldmark_core::{ExtractionMode, FsOverlayStore, Template, TemplateExtractionEngine};

/// `<config dir>/fieldmark/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldmark")
        .join("config.json")
}

/// Explicit `--config` file, else the default file if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<FieldmarkConfig> {
    if let Some(path) = config_path {
        return FieldmarkConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config from {}", default_path.display());
        return Ok(FieldmarkConfig::from_file(&default_path)?);
    }

    Ok(FieldmarkConfig::default())
}

pub fn load_template(path: &Path) -> anyhow::Result<Template> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read template {}: {}", path.display(), e))?;
    let template = Template::from_json(&content)?;
    debug!(
        "Loaded template '{}' with {} field(s), {} rejected",
        template.template_name,
        template.fields.len(),
        template.rejected.len()
    );
    Ok(template)
}

/// Engine with filesystem overlays, plus the HTTP language model when
/// `mode` asks for it.
///
/// Builds a blocking HTTP client, so call it from a blocking context.
pub fn build_engine(config: &FieldmarkConfig, mode: ExtractionMode) -> anyhow::Result<TemplateExtractionEngine> {
    let mut engine = TemplateExtractionEngine::new(config)?
        .with_overlay_store(Box::new(FsOverlayStore::new(config.storage.overlay_dir.clone())));
    if mode == ExtractionMode::MatchingLlm {
        engine = engine.with_http_llm();
    }
    Ok(engine)
}
