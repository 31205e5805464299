//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] sends each call to `/api/generate` with the system and
//! user prompts combined into one prompt, `stream: false`, and the sampling
//! parameters in `options`.

use super::{parse_retry_after, request_error, status_error, Backend, BackendCallSpec};
use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// Backend for a local (or remote) Ollama server. No authentication.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a backend for the given server URL (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Use a preconfigured HTTP client (shared connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base
            .strip_suffix("/api/generate")
            .or_else(|| base.strip_suffix("/api"))
            .unwrap_or(base);
        format!("{}/api/generate", base)
    }

    /// Build the JSON body for `/api/generate`.
    fn build_body(&self, spec: &BackendCallSpec) -> Value {
        json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", spec.system_prompt, spec.user_prompt),
            "stream": false,
            "options": {
                "temperature": spec.temperature,
                "num_predict": spec.max_tokens,
            },
        })
    }

    fn extract_content(json_resp: &Value) -> Result<String> {
        json_resp
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::transport("malformed response body: missing 'response' field")
            })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(&self, spec: &BackendCallSpec) -> Result<String> {
        let url = self.endpoint();
        debug!(model = %self.model, %url, "sending ollama generate");

        let resp = self
            .client
            .post(&url)
            .timeout(spec.timeout)
            .json(&self.build_body(spec))
            .send()
            .await
            .map_err(|e| request_error("ollama", &url, spec.timeout, e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error("ollama", status, body, retry_after));
        }

        let json_resp: Value = resp
            .json()
            .await
            .map_err(|e| request_error("ollama", &url, spec.timeout, e))?;
        Self::extract_content(&json_resp)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
