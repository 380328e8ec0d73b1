//! Field matching and extraction.
//!
//! Three evidence sources feed one result list per template run: literal
//! keyword anchors, role-specific regex heuristics and, optionally, the
//! language model (see [`crate::llm`]).

pub mod engine;
pub mod matcher;
pub mod normalizer;
pub mod presets;
pub mod rules;

pub use engine::{ExtractionMode, ExtractionOutput, TemplateExtractionEngine};
pub use matcher::{FieldMatcher, LlmOverride, MatchMode};
pub use normalizer::CoordinateNormalizer;
pub use presets::{FieldPreset, FieldRole, PresetTable};
