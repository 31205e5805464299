//! Per-format generation: prompt assembly, backend call, post-processing.
//!
//! A [`FormatGenerator`] binds one format id to its [`FormatKind`], its
//! [`PromptTemplate`] and the shared backend. The orchestrator builds one per
//! requested format; generators are cheap (the backend is behind an `Arc`).

use crate::{
    backend::{self, Backend, BackendCallSpec, BackoffConfig},
    error::Result,
    formats::FormatKind,
    templates::PromptTemplate,
    types::GenerationOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-call backend timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Generates and post-processes one format.
pub struct FormatGenerator {
    format_id: String,
    kind: FormatKind,
    template: PromptTemplate,
    backend: Arc<dyn Backend>,
    timeout: Duration,
    backoff: BackoffConfig,
}

impl std::fmt::Debug for FormatGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatGenerator")
            .field("format_id", &self.format_id)
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.backoff.max_retries)
            .finish()
    }
}

impl FormatGenerator {
    pub fn new(kind: FormatKind, template: PromptTemplate, backend: Arc<dyn Backend>) -> Self {
        Self {
            format_id: template.format_id.clone(),
            kind,
            template,
            backend,
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffConfig::none(),
        }
    }

    /// Set the per-call backend timeout. Default: 60 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the transport retry policy. Default: [`BackoffConfig::none()`].
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn format_id(&self) -> &str {
        &self.format_id
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn default_temperature(&self) -> f64 {
        self.kind.default_temperature()
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.kind.default_max_tokens()
    }

    /// Build the backend call for `input_text`, applying per-call overrides.
    pub fn call_spec(&self, input_text: &str, options: &GenerationOptions) -> BackendCallSpec {
        BackendCallSpec {
            system_prompt: self.template.system_text.clone(),
            user_prompt: self.template.render(input_text),
            temperature: options.temperature.unwrap_or_else(|| self.default_temperature()),
            max_tokens: options.max_tokens.unwrap_or_else(|| self.default_max_tokens()),
            timeout: self.timeout,
        }
    }

    /// Call the backend and return the raw completion.
    pub async fn generate(&self, input_text: &str, options: &GenerationOptions) -> Result<String> {
        self.generate_cancellable(input_text, options, None).await
    }

    /// Like [`generate`](Self::generate), but stops between retries once
    /// `cancel` fires.
    pub async fn generate_cancellable(
        &self,
        input_text: &str,
        options: &GenerationOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let spec = self.call_spec(input_text, options);
        spec.validate()?;

        info!(
            format = %self.format_id,
            backend = self.backend.name(),
            temperature = spec.temperature,
            max_tokens = spec.max_tokens,
            "generating format"
        );

        let format_id = self.format_id.as_str();
        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            warn!(
                format = %format_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "retrying backend call"
            );
        };

        let raw = backend::with_backoff(
            &self.backend,
            &spec,
            &self.backoff,
            cancel,
            Some(&mut on_retry),
        )
        .await?;

        debug!(format = %self.format_id, chars = raw.chars().count(), "raw completion received");
        Ok(raw)
    }

    /// Format-specific cleanup and shape validation.
    pub fn post_process(&self, content: &str) -> Result<String> {
        self.kind.post_process(&self.format_id, content)
    }

    /// [`generate`](Self::generate) followed by [`post_process`](Self::post_process).
    pub async fn run(
        &self,
        input_text: &str,
        options: &GenerationOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let raw = self.generate_cancellable(input_text, options, cancel).await?;
        self.post_process(&raw)
    }
}
