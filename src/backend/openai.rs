//! Backend for OpenAI-compatible chat APIs.
//!
//! [`OpenAiBackend`] serves both the `openai` and `openrouter` providers:
//! OpenRouter speaks the same protocol, only the base URL, key and model
//! differ.
//!
//! Endpoint: `{base_url}/chat/completions` (always chat mode, non-streaming).

use super::{parse_retry_after, request_error, status_error, Backend, BackendCallSpec};
use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use content_formats::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new("https://api.openai.com/v1", "gpt-4o")
///     .with_api_key("sk-...");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    /// Sent as `Authorization: Bearer {key}`. Required by the hosted APIs.
    api_key: Option<String>,
    provider: &'static str,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| {
                    if k.chars().count() > 6 {
                        format!("{}***", k.chars().take(6).collect::<String>())
                    } else {
                        "***".to_string()
                    }
                }),
            )
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a backend for the given base URL (e.g. `https://api.openai.com/v1`)
    /// and model, without a key.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            provider: "openai",
        }
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Label used in logs and errors (`"openai"`, `"openrouter"`).
    pub fn with_provider_label(mut self, provider: &'static str) -> Self {
        self.provider = provider;
        self
    }

    /// Use a preconfigured HTTP client (shared connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Full URL of the chat completions endpoint.
    fn endpoint(&self) -> String {
        let base = self
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions");
        format!("{}/chat/completions", base)
    }

    /// Build the request body for `/chat/completions`.
    fn build_body(&self, spec: &BackendCallSpec) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": spec.system_prompt},
                {"role": "user", "content": spec.user_prompt},
            ],
            "temperature": spec.temperature,
            "max_tokens": spec.max_tokens,
            "stream": false,
        })
    }

    /// Pull `choices[0].message.content` out of a completion response.
    fn extract_content(json_resp: &Value) -> Result<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::transport(
                    "malformed response body: missing choices[0].message.content",
                )
            })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn generate(&self, spec: &BackendCallSpec) -> Result<String> {
        let key = match self.api_key.as_deref() {
            Some(k) if !k.trim().is_empty() => k,
            _ => {
                return Err(GenerationError::Authentication {
                    provider: self.provider.to_string(),
                    message: "API key is not set".into(),
                })
            }
        };

        let url = self.endpoint();
        debug!(provider = self.provider, model = %self.model, %url, "sending chat completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(spec.timeout)
            .json(&self.build_body(spec))
            .send()
            .await
            .map_err(|e| request_error(self.provider, &url, spec.timeout, e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.provider, status, body, retry_after));
        }

        let json_resp: Value = resp
            .json()
            .await
            .map_err(|e| request_error(self.provider, &url, spec.timeout, e))?;
        Self::extract_content(&json_resp)
    }

    fn name(&self) -> &'static str {
        self.provider
    }
}
