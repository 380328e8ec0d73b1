//! Error types for the fieldmark-core library.

use thiserror::Error;

/// Main error type for the fieldmark library.
#[derive(Error, Debug)]
pub enum FieldmarkError {
    /// Malformed template field or layout fragment.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// External language-model extraction failed.
    #[error("remote extraction error: {0}")]
    Remote(#[from] RemoteExtractionError),

    /// Text layout could not be read.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Overlay or annotation persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A single rejected field definition or fragment.
///
/// Input errors never abort a run: the offending item is skipped and the
/// error is reported as a match detail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Field definition failed validation.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// A field name appeared twice in one template.
    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    /// Fragment could not be read from the layout.
    #[error("malformed fragment {index} on page {page}: {reason}")]
    MalformedFragment {
        page: usize,
        index: usize,
        reason: String,
    },

    /// Bounding box is not four finite numbers.
    #[error("invalid bounding box: {0}")]
    InvalidBBox(String),
}

impl InputError {
    /// Name of the template field or layout scope this error concerns.
    pub fn scope(&self) -> &str {
        match self {
            InputError::InvalidField { field, .. } => field,
            InputError::DuplicateField(field) => field,
            InputError::MalformedFragment { .. } | InputError::InvalidBBox(_) => "layout",
        }
    }
}

/// Errors from the language-model reconciliation path.
#[derive(Error, Debug)]
pub enum RemoteExtractionError {
    /// No endpoint, model or API key available.
    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    /// Connection or request failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call did not complete within the configured timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The answer could not be parsed into the expected structure.
    #[error("unparsable model output: {0}")]
    Parse(String),
}

/// Errors from the text-layout provider.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Failed to read the layout source.
    #[error("failed to read layout: {0}")]
    Read(String),

    /// Layout source is not in a recognised shape.
    #[error("unrecognised layout format: {0}")]
    Format(String),

    /// No page carries any text; upstream should force OCR.
    #[error("no extractable text")]
    NoText,
}

/// Errors from overlay/annotation persistence.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Document identity cannot be used as a storage key.
    #[error("invalid document id: {0}")]
    InvalidKey(String),

    /// Underlying write or read failed.
    #[error("storage I/O failed: {0}")]
    Io(String),
}

/// Result type for the fieldmark library.
pub type Result<T> = std::result::Result<T, FieldmarkError>;
