//! Provider trait: the abstraction over the language-model service.
//!
//! A Provider knows how to send an ordered, role-tagged prompt to a model and
//! return its free-form output text, and how to embed a piece of text into a
//! fixed-length vector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::PromptMessage;

/// A single model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4.1-mini")
    pub model: String,

    /// Ordered prompt: system messages first, the user message last
    pub messages: Vec<PromptMessage>,

    /// Content-derived key that lets the upstream service reuse cached prefix work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,

    /// Cap on generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Upstream response id, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The generated text
    pub output_text: String,

    /// The untouched response payload, kept for metadata
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ProviderResponse {
    /// A response with no upstream payload (mocks, tests).
    pub fn text(output_text: impl Into<String>) -> Self {
        Self {
            id: None,
            output_text: output_text.into(),
            raw: serde_json::Value::Null,
        }
    }
}

/// An embedding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The text to embed.
    pub input: String,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
        }
    }
}

/// The core Provider trait.
///
/// The orchestrator and router call `complete()` and `embed()` without
/// knowing which backend answers. Cancellation is by dropping the future.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Embed a single text.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }
}
