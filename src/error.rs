use std::time::Duration;
use thiserror::Error;

/// Errors produced by the generation pipeline and its components.
///
/// Every variant carries owned strings only, so errors are `Clone` and can be
/// scripted into a [`MockBackend`](crate::backend::MockBackend).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// Credentials are missing or were rejected by the provider (HTTP 401/403).
    #[error("authentication with {provider} failed: {message}")]
    Authentication { provider: String, message: String },

    /// The call could not complete: connection failure, non-success status,
    /// or a response body that does not have the expected shape.
    #[error("{}", transport_message(*status, message))]
    Transport {
        /// HTTP status code, if the provider answered at all.
        status: Option<u16>,
        message: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The call exceeded its configured timeout window.
    #[error("request to {provider} timed out after {}s", timeout.as_secs_f64())]
    Timeout { provider: String, timeout: Duration },

    /// The format identifier is not registered.
    #[error("format '{format_id}' is not registered (available: {available})")]
    UnknownFormat { format_id: String, available: String },

    /// The template definition source is malformed.
    #[error("failed to load prompt templates: {0}")]
    TemplateLoad(String),

    /// Model output cannot be made to satisfy the format's minimal shape.
    #[error("output for '{format_id}' rejected: {reason}")]
    Validation { format_id: String, reason: String },

    /// Malformed top-level input, detected before any per-format work.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid process configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The batch was cancelled before this unit of work completed.
    #[error("generation was cancelled")]
    Cancelled,

    /// The output sink failed to persist a result.
    #[error("failed to persist output: {0}")]
    Sink(String),
}

fn transport_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("transport failure: {}", message),
    }
}

impl GenerationError {
    /// Build a [`GenerationError::Transport`] without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        GenerationError::Transport {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Stable taxonomy name, used as the prefix of per-format error details.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Authentication { .. } => "AuthenticationError",
            GenerationError::Transport { .. } => "TransportError",
            GenerationError::Timeout { .. } => "TimeoutError",
            GenerationError::UnknownFormat { .. } => "UnknownFormatError",
            GenerationError::TemplateLoad(_) => "TemplateLoadError",
            GenerationError::Validation { .. } => "ValidationError",
            GenerationError::InvalidRequest(_) => "InvalidRequestError",
            GenerationError::Config(_) => "ConfigError",
            GenerationError::Cancelled => "CancelledError",
            GenerationError::Sink(_) => "SinkError",
        }
    }

    /// `"<Kind>: <message>"`, the form recorded in a failed result entry.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
