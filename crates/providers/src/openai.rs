//! OpenAI provider implementation.
//!
//! Talks to the Responses API (`/responses`) for completions and to
//! `/embeddings` for vectors. Any endpoint exposing the same two routes works
//! through `base_url`. Both calls go through the configured [`RetryPolicy`].

use agentkit_config::AppConfig;
use agentkit_core::error::ProviderError;
use agentkit_core::message::PromptMessage;
use agentkit_core::provider::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

/// A provider for OpenAI's Responses and Embeddings APIs.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// Create a provider with a fixed per-request client timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Build from application config. Fails when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key (set api_key, AGENTKIT_API_KEY or OPENAI_API_KEY)".into(),
            )
        })?;
        Ok(Self::new(
            &config.provider.base_url,
            api_key,
            Duration::from_secs(config.provider.timeout_secs),
        )?
        .with_retry(RetryPolicy::from_config(&config.provider)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn to_api_input(messages: &[PromptMessage]) -> Vec<ApiInputMessage> {
        messages
            .iter()
            .map(|m| ApiInputMessage {
                r#type: "message",
                role: m.role.as_str(),
                content: vec![ApiContentItem {
                    r#type: "input_text",
                    text: m.content.clone(),
                }],
            })
            .collect()
    }

    /// Request body for `/responses`; optional fields only when set.
    fn responses_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "input": Self::to_api_input(&request.messages),
        });
        if let Some(key) = &request.prompt_cache_key {
            body["prompt_cache_key"] = serde_json::json!(key);
        }
        if let Some(max) = request.max_output_tokens {
            body["max_output_tokens"] = serde_json::json!(max);
        }
        body
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, path, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
            }
        })
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// The reply text of a Responses payload.
///
/// Prefers the top-level `output_text` convenience field, then the first
/// `output_text` content item of the first `message` output, then the first
/// text content of any kind.
pub fn extract_output_text(raw: &serde_json::Value) -> String {
    if let Some(text) = raw.get("output_text").and_then(|v| v.as_str()) {
        return text.to_string();
    }

    let Some(output) = raw.get("output").and_then(|v| v.as_array()) else {
        return String::new();
    };

    let message = output
        .iter()
        .find(|item| item.get("type").and_then(|t| t.as_str()) == Some("message"))
        .or_else(|| output.first());
    let Some(content) = message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    else {
        return String::new();
    };

    content
        .iter()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("output_text"))
        .or_else(|| content.first())
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl agentkit_core::Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::responses_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            cache_key = request.prompt_cache_key.as_deref().unwrap_or(""),
            "Sending responses request"
        );

        let raw = self
            .retry
            .run("complete", || self.post_json("responses", &body))
            .await?;

        let id = raw.get("id").and_then(|v| v.as_str()).map(str::to_string);
        let output_text = extract_output_text(&raw);

        Ok(ProviderResponse {
            id,
            output_text,
            raw,
        })
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "input": [request.input],
        });

        debug!(model = %request.model, "Sending embedding request");

        let raw = self
            .retry
            .run("embed", || self.post_json("embeddings", &body))
            .await?;

        let parsed: EmbeddingApiResponse = serde_json::from_value(raw).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding response".into()))
    }
}

// --- API types ---

#[derive(Debug, Serialize)]
struct ApiInputMessage {
    r#type: &'static str,
    role: &'static str,
    content: Vec<ApiContentItem>,
}

#[derive(Debug, Serialize)]
struct ApiContentItem {
    r#type: &'static str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
