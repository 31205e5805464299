//! Backend trait and the per-call request value.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating a
//! normalized [`BackendCallSpec`] into a provider-specific HTTP call and
//! returning the raw completion text. Built-in implementations:
//! [`OpenAiBackend`], [`OllamaBackend`], [`MockBackend`].
//!
//! ## Architecture
//!
//! ```text
//! FormatGenerator ──► BackendCallSpec ──► Backend::generate() ──► String
//!                                              │
//!                                   ┌──────────┴──────────┐
//!                              OpenAiBackend         OllamaBackend
//!                          /v1/chat/completions      /api/generate
//!                          (openai, openrouter)
//! ```
//!
//! Backends never retry. Transport retry is layered on top by the
//! orchestrator through [`with_backoff`].

pub mod backoff;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// A single, provider-agnostic generation call.
///
/// Constructed fresh for every call by the
/// [`FormatGenerator`](crate::generator::FormatGenerator); never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCallSpec {
    /// System instructions.
    pub system_prompt: String,
    /// The user message, with the input text already substituted.
    pub user_prompt: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    /// Completion length cap, in tokens.
    pub max_tokens: u32,
    /// Per-call timeout enforced by the backend.
    pub timeout: Duration,
}

impl BackendCallSpec {
    /// Check the call constraints: non-empty prompts, temperature in `[0, 1]`,
    /// positive token cap.
    pub fn validate(&self) -> Result<()> {
        if self.system_prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "system prompt must not be empty".into(),
            ));
        }
        if self.user_prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "user prompt must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature {} outside 0.0-1.0",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Abstraction over LLM providers.
///
/// Implementors make exactly one outbound call per [`generate`](Backend::generate)
/// and return the model's completion untouched; the caller owns all
/// post-processing. Failures map onto the backend error kinds:
/// [`GenerationError::Authentication`], [`GenerationError::Transport`] and
/// [`GenerationError::Timeout`].
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one non-streaming completion.
    async fn generate(&self, spec: &BackendCallSpec) -> Result<String>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`GenerationError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`GenerationError::Transport`] with a status in `config.retryable_statuses`
/// - [`GenerationError::Transport`] without a status (connection failure)
/// - [`GenerationError::Timeout`]
///
/// Authentication failures are never retried.
pub fn is_retryable(error: &GenerationError, config: &BackoffConfig) -> bool {
    match error {
        GenerationError::Transport {
            status: Some(status),
            ..
        } => config.retryable_statuses.contains(status),
        GenerationError::Transport { status: None, .. } => true,
        GenerationError::Timeout { .. } => true,
        _ => false,
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Returns the first successful completion, or the last error once retries
/// are exhausted. With [`BackoffConfig::none()`] this is a single call.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    spec: &BackendCallSpec,
    config: &BackoffConfig,
    cancel: Option<&CancellationToken>,
    mut on_retry: RetryCallback<'_>,
) -> Result<String> {
    let mut last_error: Option<GenerationError> = None;

    for attempt in 0..=config.max_retries {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(GenerationError::Cancelled);
        }

        if attempt > 0 {
            let delay = match &last_error {
                Some(GenerationError::Transport {
                    retry_after: Some(ra),
                    ..
                }) if config.respect_retry_after => *ra,
                _ => config.delay_for_attempt(attempt - 1),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::time::sleep(delay).await;
        }

        match backend.generate(spec).await {
            Ok(content) => return Ok(content),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        GenerationError::transport("backoff loop exited unexpectedly")
    }))
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(
    provider: &str,
    status: u16,
    body: String,
    retry_after: Option<Duration>,
) -> GenerationError {
    match status {
        401 | 403 => GenerationError::Authentication {
            provider: provider.to_string(),
            message: format!("HTTP {}: {}", status, body),
        },
        _ => GenerationError::Transport {
            status: Some(status),
            message: body,
            retry_after,
        },
    }
}

/// Map a `reqwest` failure onto the error taxonomy.
pub(crate) fn request_error(
    provider: &str,
    url: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout {
            provider: provider.to_string(),
            timeout,
        }
    } else if err.is_decode() {
        GenerationError::transport(format!("malformed response body from {}: {}", url, err))
    } else {
        GenerationError::transport(format!("failed to reach LLM at {}: {}", url, err))
    }
}

/// Parse a `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn spec() -> BackendCallSpec {
        BackendCallSpec {
            system_prompt: "You write emails.".into(),
            user_prompt: "Write about the launch".into(),
            temperature: 0.7,
            max_tokens: 300,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_prompts() {
        let mut s = spec();
        s.system_prompt = "  ".into();
        assert!(matches!(s.validate(), Err(GenerationError::InvalidRequest(_))));

        let mut s = spec();
        s.user_prompt = String::new();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_parameters() {
        let mut s = spec();
        s.temperature = 1.2;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.max_tokens = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_is_retryable_503() {
        let config = BackoffConfig::standard();
        let err = GenerationError::Transport {
            status: Some(503),
            message: "service unavailable".into(),
            retry_after: None,
        };
        assert!(is_retryable(&err, &config));
    }

    #[test]
    fn test_is_retryable_400_not_retried() {
        let config = BackoffConfig::standard();
        let err = GenerationError::Transport {
            status: Some(400),
            message: "bad request".into(),
            retry_after: None,
        };
        assert!(!is_retryable(&err, &config));
    }

    #[test]
    fn test_authentication_never_retried() {
        let config = BackoffConfig::aggressive();
        let err = GenerationError::Authentication {
            provider: "openai".into(),
            message: "invalid key".into(),
        };
        assert!(!is_retryable(&err, &config));
    }

    #[test]
    fn test_status_error_maps_auth_statuses() {
        assert_eq!(
            status_error("openai", 401, "nope".into(), None).kind(),
            "AuthenticationError"
        );
        assert_eq!(
            status_error("openai", 403, "nope".into(), None).kind(),
            "AuthenticationError"
        );
        assert_eq!(
            status_error("openai", 500, "boom".into(), None).kind(),
            "TransportError"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_backoff_retries_then_succeeds() {
        let mock = MockBackend::scripted(vec![
            Err(GenerationError::Transport {
                status: Some(503),
                message: "busy".into(),
                retry_after: None,
            }),
            Ok("done".into()),
        ]);
        let backend: Arc<dyn Backend> = Arc::new(mock);
        let mut config = BackoffConfig::standard();
        config.initial_delay = Duration::from_millis(1);
        config.max_delay = Duration::from_millis(2);

        let retries = AtomicU32::new(0);
        let mut on_retry = |_attempt: u32, _delay: Duration, _reason: &str| {
            retries.fetch_add(1, Ordering::Relaxed);
        };

        let result = with_backoff(&backend, &spec(), &config, None, Some(&mut on_retry)).await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(retries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_backoff_none_returns_first_error() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::failing(GenerationError::Timeout {
            provider: "mock".into(),
            timeout: Duration::from_secs(1),
        }));
        let result = with_backoff(&backend, &spec(), &BackoffConfig::none(), None, None).await;
        assert_eq!(result.unwrap_err().kind(), "TimeoutError");
    }

    #[tokio::test]
    async fn test_backoff_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::fixed("never"));
        let result = with_backoff(
            &backend,
            &spec(),
            &BackoffConfig::standard(),
            Some(&token),
            None,
        )
        .await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
    }
}
