//! Language-model evidence.
//!
//! The reconciler is transport-agnostic; the HTTP transport is only compiled
//! with the `llm` feature.

#[cfg(feature = "llm")]
mod client;
pub mod protocol;
mod reconciler;

#[cfg(feature = "llm")]
pub use client::HttpTransport;
pub use reconciler::{LlmField, LlmReconciler};

use crate::error::RemoteExtractionError;

/// A single-turn prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
}

/// Sends one prompt and returns the model's text answer.
///
/// Implementations make exactly one attempt; retries belong to the caller.
pub trait LlmTransport {
    fn complete(&self, request: &LlmRequest) -> Result<String, RemoteExtractionError>;
}
