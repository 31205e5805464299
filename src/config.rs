//! Process configuration, read from environment variables.
//!
//! | Variable               | Default                          |
//! |------------------------|----------------------------------|
//! | `AI_PROVIDER`          | `openai`                         |
//! | `OPENAI_API_KEY`       | unset                            |
//! | `OPENAI_BASE_URL`      | `https://api.openai.com/v1`      |
//! | `OPENAI_MODEL`         | `gpt-4o`                         |
//! | `OPENROUTER_API_KEY`   | unset                            |
//! | `OPENROUTER_BASE_URL`  | `https://openrouter.ai/api/v1`   |
//! | `OPENROUTER_MODEL`     | `x-ai/grok-4.1-fast:free`        |
//! | `OLLAMA_BASE_URL`      | `http://localhost:11434`         |
//! | `OLLAMA_MODEL`         | `llama3.2`                       |
//! | `REQUEST_TIMEOUT_SECS` | `60`                             |
//! | `OUTPUT_DIR`           | `./outputs`                      |
//! | `MAX_CONCURRENCY`      | `4`                              |
//! | `MAX_RETRIES`          | `0`                              |
//! | `PROMPTS_PATH`         | unset (built-in templates)       |
//!
//! Empty values count as unset.

use crate::{
    backend::{Backend, BackoffConfig, OllamaBackend, OpenAiBackend},
    error::{GenerationError, Result},
    orchestrator::{OrchestratorBuilder, DEFAULT_CONCURRENCY},
    sink::FileSink,
    templates::TemplateStore,
};
use reqwest::Client;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The LLM providers a process can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(GenerationError::Config(format!(
                "unknown AI_PROVIDER '{}' (expected openai, openrouter or ollama)",
                other
            ))),
        }
    }
}

/// Resolved process settings.
#[derive(Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub openrouter_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    pub max_concurrency: usize,
    pub max_retries: u32,
    /// YAML template file replacing the built-in templates.
    pub prompts_path: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field(
                "openrouter_api_key",
                &self.openrouter_api_key.as_ref().map(|_| "***"),
            )
            .field("openrouter_base_url", &self.openrouter_base_url)
            .field("openrouter_model", &self.openrouter_model)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("ollama_model", &self.ollama_model)
            .field("request_timeout", &self.request_timeout)
            .field("output_dir", &self.output_dir)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_retries", &self.max_retries)
            .field("prompts_path", &self.prompts_path)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            openrouter_api_key: None,
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            openrouter_model: "x-ai/grok-4.1-fast:free".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            request_timeout: Duration::from_secs(60),
            output_dir: PathBuf::from("./outputs"),
            max_concurrency: DEFAULT_CONCURRENCY,
            max_retries: 0,
            prompts_path: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let provider = match get("AI_PROVIDER") {
            Some(value) => value.parse()?,
            None => defaults.provider,
        };

        let request_timeout = match parse_number::<u64>("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"))? {
            Some(0) => {
                return Err(GenerationError::Config(
                    "REQUEST_TIMEOUT_SECS must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        let max_concurrency = match parse_number::<usize>("MAX_CONCURRENCY", get("MAX_CONCURRENCY"))? {
            Some(0) => {
                return Err(GenerationError::Config(
                    "MAX_CONCURRENCY must be at least 1".to_string(),
                ))
            }
            Some(n) => n,
            None => defaults.max_concurrency,
        };

        Ok(Self {
            provider,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_base_url: get("OPENROUTER_BASE_URL").unwrap_or(defaults.openrouter_base_url),
            openrouter_model: get("OPENROUTER_MODEL").unwrap_or(defaults.openrouter_model),
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            request_timeout,
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            max_concurrency,
            max_retries: parse_number("MAX_RETRIES", get("MAX_RETRIES"))?.unwrap_or(defaults.max_retries),
            prompts_path: get("PROMPTS_PATH").map(PathBuf::from),
        })
    }

    /// Model name of the configured provider.
    pub fn model(&self) -> &str {
        match self.provider {
            ProviderKind::OpenAi => &self.openai_model,
            ProviderKind::OpenRouter => &self.openrouter_model,
            ProviderKind::Ollama => &self.ollama_model,
        }
    }

    /// Transport retry policy derived from `max_retries`.
    pub fn backoff(&self) -> BackoffConfig {
        match self.max_retries {
            0 => BackoffConfig::none(),
            n => BackoffConfig::standard().with_max_retries(n),
        }
    }

    /// Templates from `prompts_path`, or the built-in ones.
    pub fn template_store(&self) -> Result<TemplateStore> {
        match &self.prompts_path {
            Some(path) => TemplateStore::from_path(path),
            None => TemplateStore::builtin(),
        }
    }

    /// A sink writing into `output_dir`.
    pub fn file_sink(&self) -> FileSink {
        FileSink::new(&self.output_dir)
    }

    /// An orchestrator builder wired with everything except the sink.
    pub fn orchestrator_builder(&self) -> Result<OrchestratorBuilder> {
        Ok(OrchestratorBuilder::new()
            .backend(build_backend(self)?)
            .templates(self.template_store()?)
            .timeout(self.request_timeout)
            .backoff(self.backoff())
            .concurrency(self.max_concurrency))
    }
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>().map_err(|_| {
                GenerationError::Config(format!("{} must be a non-negative integer, got '{}'", key, v))
            })
        })
        .transpose()
}

/// Build the backend for the configured provider.
///
/// Called once per process; the returned handle is shared by every request.
/// A missing API key is not an error here: calls fail with
/// [`GenerationError::Authentication`] instead.
pub fn build_backend(settings: &Settings) -> Result<Arc<dyn Backend>> {
    let client = Client::builder()
        .build()
        .map_err(|e| GenerationError::Config(format!("failed to build HTTP client: {}", e)))?;

    let backend: Arc<dyn Backend> = match settings.provider {
        ProviderKind::OpenAi => Arc::new(openai_compatible(
            client,
            &settings.openai_base_url,
            &settings.openai_model,
            settings.openai_api_key.as_deref(),
            "openai",
        )),
        ProviderKind::OpenRouter => Arc::new(openai_compatible(
            client,
            &settings.openrouter_base_url,
            &settings.openrouter_model,
            settings.openrouter_api_key.as_deref(),
            "openrouter",
        )),
        ProviderKind::Ollama => Arc::new(
            OllamaBackend::new(&settings.ollama_base_url, &settings.ollama_model).with_client(client),
        ),
    };

    info!(
        provider = settings.provider.as_str(),
        model = settings.model(),
        "backend configured"
    );
    Ok(backend)
}

fn openai_compatible(
    client: Client,
    base_url: &str,
    model: &str,
    api_key: Option<&str>,
    provider: &'static str,
) -> OpenAiBackend {
    let backend = OpenAiBackend::new(base_url, model)
        .with_client(client)
        .with_provider_label(provider);
    match api_key {
        Some(key) => backend.with_api_key(key),
        None => {
            warn!(provider, "no API key configured, requests will be rejected");
            backend
        }
    }
}
