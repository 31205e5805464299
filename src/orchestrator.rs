use crate::{
    backend::{Backend, BackoffConfig},
    error::{GenerationError, Result},
    formats::{FormatInfo, FormatRegistry},
    generator::{FormatGenerator, DEFAULT_TIMEOUT},
    sink::OutputSink,
    templates::TemplateStore,
    types::{FormatOutcome, GenerationRequest, GenerationResult, OutputRecord},
};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of formats generated at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Fans one request out to every requested format and gathers the outcomes.
///
/// Built once per process and shared by handle. Each format runs
/// independently: any failure (unknown id, backend error, rejected output)
/// becomes a failed entry in the [`GenerationResult`] and never aborts the
/// rest of the batch. Entries come back in request order regardless of
/// completion order.
pub struct Orchestrator {
    store: Arc<TemplateStore>,
    registry: FormatRegistry,
    backend: Arc<dyn Backend>,
    timeout: Duration,
    backoff: BackoffConfig,
    concurrency: usize,
    sink: Option<Arc<dyn OutputSink>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("formats", &self.registry.ids())
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.backoff.max_retries)
            .field("concurrency", &self.concurrency)
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl Orchestrator {
    /// Create a new orchestrator builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Generate every requested format.
    ///
    /// Fails only when the request itself is malformed; see
    /// [`GenerationRequest::validate`].
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.execute(request, None).await
    }

    /// Like [`run`](Self::run), but stops early once `cancel` fires.
    ///
    /// Formats that already finished keep their outcome; pending and
    /// in-flight ones are reported as [`GenerationError::Cancelled`].
    pub async fn run_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        self.execute(request, Some(cancel)).await
    }

    /// Every registered format, built-in ones first.
    pub fn formats(&self) -> Vec<FormatInfo> {
        self.registry.catalog(&self.store)
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationResult> {
        request.validate()?;
        let format_ids = request.unique_format_ids();

        info!(
            formats = ?format_ids,
            backend = self.backend.name(),
            concurrency = self.concurrency,
            "starting batch"
        );

        let mut outcomes: Vec<(usize, FormatOutcome)> = stream::iter(format_ids.iter().enumerate())
            .map(|(idx, format_id)| async move {
                let outcome =
                    FormatOutcome::from_result(self.run_format(format_id, request, cancel).await);
                match &outcome.error_detail {
                    None => info!(format = %format_id, "format generated"),
                    Some(detail) => warn!(format = %format_id, error = %detail, "format failed"),
                }
                (idx, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(idx, _)| *idx);
        let mut result = GenerationResult::new();
        for (idx, outcome) in outcomes {
            result.insert(format_ids[idx].as_str(), outcome);
        }

        info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            "batch finished"
        );

        self.persist(request, &result).await;
        Ok(result)
    }

    async fn run_format(
        &self,
        format_id: &str,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(GenerationError::Cancelled);
        }

        let kind = self.registry.resolve(format_id)?;
        let template = self.store.get(format_id)?.clone();
        let generator = FormatGenerator::new(kind, template, Arc::clone(&self.backend))
            .with_timeout(self.timeout)
            .with_backoff(self.backoff.clone());
        debug!(?generator, "resolved generator");

        let work = generator.run(&request.input_text, &request.options, cancel);
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(GenerationError::Cancelled),
                outcome = work => outcome,
            },
            None => work.await,
        }
    }

    async fn persist(&self, request: &GenerationRequest, result: &GenerationResult) {
        let Some(sink) = &self.sink else {
            return;
        };
        let record = OutputRecord::new(request, result);
        if let Err(e) = sink.persist(&record).await {
            warn!(sink = sink.name(), error = %e, "failed to persist results");
        }
    }
}

/// Builder for constructing an [`Orchestrator`].
pub struct OrchestratorBuilder {
    backend: Option<Arc<dyn Backend>>,
    store: Option<TemplateStore>,
    timeout: Duration,
    backoff: BackoffConfig,
    concurrency: usize,
    sink: Option<Arc<dyn OutputSink>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            store: None,
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffConfig::none(),
            concurrency: DEFAULT_CONCURRENCY,
            sink: None,
        }
    }

    /// The backend every format is generated with. Required.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Prompt templates. Default: the templates compiled into the crate.
    pub fn templates(mut self, store: TemplateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Per-call backend timeout. Default: 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transport retry policy. Default: no retries.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Maximum number of formats generated at the same time. `1` runs them
    /// one after another.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Where finished batches are written. Default: nowhere.
    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the orchestrator, validating configuration.
    pub fn build(self) -> Result<Orchestrator> {
        let backend = self
            .backend
            .ok_or_else(|| GenerationError::Config("a backend is required".to_string()))?;

        if self.concurrency == 0 {
            return Err(GenerationError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(GenerationError::Config(
                "timeout must be positive".to_string(),
            ));
        }

        let store = match self.store {
            Some(store) => store,
            None => TemplateStore::builtin()?,
        };
        let registry = FormatRegistry::from_store(&store);

        Ok(Orchestrator {
            store: Arc::new(store),
            registry,
            backend,
            timeout: self.timeout,
            backoff: self.backoff,
            concurrency: self.concurrency,
            sink: self.sink,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
