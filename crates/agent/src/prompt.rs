//! Prompt assembly: ordered system messages, then the user message.
//!
//! The pinned context goes first and alone determines the cache key, so
//! every turn sharing a context file shares the upstream prefix cache.

use agentkit_core::message::PromptMessage;
use agentkit_core::provider::ProviderRequest;
use sha2::{Digest, Sha256};

/// Cache key for a pinned context: `ctx-` + hex SHA-256 of its text.
pub fn context_cache_key(text: &str) -> String {
    format!("ctx-{}", hex::encode(Sha256::digest(text.as_bytes())))
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system: Vec<String>,
    cache_key: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cacheable context block. The first non-empty one sets the
    /// cache key; empty text is ignored.
    pub fn with_cached_context(mut self, text: &str) -> Self {
        if text.is_empty() {
            return self;
        }
        if self.cache_key.is_none() {
            self.cache_key = Some(context_cache_key(text));
        }
        self.system.push(text.to_string());
        self
    }

    /// Add a system message. Empty text is ignored.
    pub fn with_system_prompt(mut self, text: &str) -> Self {
        if !text.is_empty() {
            self.system.push(text.to_string());
        }
        self
    }

    /// The request: every system message in insertion order, then `user`.
    pub fn build(&self, model: &str, user: &str) -> ProviderRequest {
        let mut messages: Vec<PromptMessage> =
            self.system.iter().map(PromptMessage::system).collect();
        messages.push(PromptMessage::user(user));
        ProviderRequest {
            model: model.to_string(),
            messages,
            prompt_cache_key: self.cache_key.clone(),
            max_output_tokens: None,
        }
    }
}
