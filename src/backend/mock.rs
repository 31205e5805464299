//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] returns scripted replies in order, and can route replies
//! by a marker found in the system prompt so concurrent formats get
//! deterministic answers regardless of execution order.
//!
//! # Example
//!
//! ```
//! use content_formats::backend::MockBackend;
//! use content_formats::GenerationError;
//! use std::time::Duration;
//!
//! let mock = MockBackend::fixed("Hello, world!")
//!     .when_system_contains("email", Err(GenerationError::Timeout {
//!         provider: "mock".into(),
//!         timeout: Duration::from_secs(1),
//!     }));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Backend, BackendCallSpec};
use crate::error::{GenerationError, Result};

type Reply = Result<String>;

/// A test backend that returns scripted replies.
///
/// Routed replies (see [`when_system_contains`](Self::when_system_contains))
/// take precedence. Otherwise replies cycle in order. Every call is recorded.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<Reply>,
    routes: Vec<(String, Reply)>,
    index: AtomicUsize,
    delay: Option<Duration>,
    calls: Mutex<Vec<BackendCallSpec>>,
}

impl MockBackend {
    /// Create a mock that cycles through the given replies.
    pub fn scripted(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "MockBackend requires at least one reply");
        Self {
            replies,
            routes: Vec::new(),
            index: AtomicUsize::new(0),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that cycles through the given successful responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock that always fails with the given error.
    pub fn failing(error: GenerationError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    /// Reply with `reply` whenever the system prompt contains `marker`.
    pub fn when_system_contains(mut self, marker: impl Into<String>, reply: Reply) -> Self {
        self.routes.push((marker.into(), reply));
        self
    }

    /// Sleep for `delay` before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Snapshot of every call received so far.
    pub fn calls(&self) -> Vec<BackendCallSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_reply(&self, spec: &BackendCallSpec) -> Reply {
        if let Some((_, reply)) = self
            .routes
            .iter()
            .find(|(marker, _)| spec.system_prompt.contains(marker.as_str()))
        {
            return reply.clone();
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate(&self, spec: &BackendCallSpec) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(spec)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
