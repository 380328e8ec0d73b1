//! Core library for template field matching on document layouts.
//!
//! This crate provides:
//! - Text layout input (fragments with bounding boxes, per page)
//! - Keyword and regex field matching with party discriminators
//! - Optional language-model refinement over HTTP
//! - Coordinate normalization into annotation view space
//! - Annotation records and per-document overlay storage

pub mod error;
pub mod extraction;
pub mod layout;
pub mod llm;
pub mod models;
pub mod storage;

pub use error::{FieldmarkError, Result};
pub use extraction::{
    CoordinateNormalizer, ExtractionMode, ExtractionOutput, FieldMatcher, PresetTable,
    TemplateExtractionEngine,
};
pub use layout::{BBox, Document, JsonLayoutProvider, TextFragment, TextLayoutProvider};
pub use llm::{LlmReconciler, LlmTransport};
#[cfg(feature = "llm")]
pub use llm::HttpTransport;
pub use models::annotation::{
    AnnotationRecord, ApplyPolicy, ExtractionResult, MatchCandidate, MatchDetail, Strategy, materialize,
};
pub use models::config::FieldmarkConfig;
pub use models::template::{Coordinates, FieldDefinition, FieldType, Template};
pub use storage::{FsOverlayStore, MemoryOverlayStore, OverlayStore};
