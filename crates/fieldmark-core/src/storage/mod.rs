//! Per-document overlay persistence.
//!
//! Overlay data is the template's free-form drawing payload. It is stored
//! verbatim, keyed by document id, and never interpreted here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;

/// Overlay store keyed by document id.
pub trait OverlayStore {
    /// Replace the overlay for `document_id`.
    fn save(&self, document_id: &str, overlay: &Value) -> Result<(), StorageError>;

    /// Stored overlay, if any.
    fn load(&self, document_id: &str) -> Result<Option<Value>, StorageError>;
}

/// Ids become file names, so path syntax is refused.
fn validate_key(document_id: &str) -> Result<(), StorageError> {
    let bad = document_id.trim().is_empty()
        || document_id.contains(['/', '\\'])
        || document_id == "."
        || document_id.contains("..");
    if bad {
        return Err(StorageError::InvalidKey(document_id.to_string()));
    }
    Ok(())
}

/// One `<id>.json` file per document under a directory.
#[derive(Debug, Clone)]
pub struct FsOverlayStore {
    dir: PathBuf,
}

impl FsOverlayStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf, StorageError> {
        validate_key(document_id)?;
        Ok(self.dir.join(format!("{}.json", document_id)))
    }
}

impl OverlayStore for FsOverlayStore {
    fn save(&self, document_id: &str, overlay: &Value) -> Result<(), StorageError> {
        let path = self.path_for(document_id)?;
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io(e.to_string()))?;
        let content = serde_json::to_string_pretty(overlay).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::write(&path, content).map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))?;
        debug!("Saved overlay to {}", path.display());
        Ok(())
    }

    fn load(&self, document_id: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(document_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryOverlayStore {
    overlays: Mutex<HashMap<String, Value>>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OverlayStore for MemoryOverlayStore {
    fn save(&self, document_id: &str, overlay: &Value) -> Result<(), StorageError> {
        validate_key(document_id)?;
        let mut overlays = self
            .overlays
            .lock()
            .map_err(|_| StorageError::Io("overlay store poisoned".to_string()))?;
        overlays.insert(document_id.to_string(), overlay.clone());
        Ok(())
    }

    fn load(&self, document_id: &str) -> Result<Option<Value>, StorageError> {
        let overlays = self
            .overlays
            .lock()
            .map_err(|_| StorageError::Io("overlay store poisoned".to_string()))?;
        Ok(overlays.get(document_id).cloned())
    }
}
