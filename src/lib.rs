//! # Content Formats
//!
//! Turn one piece of free text into several ready-to-use content formats
//! (a chat post, an email, an official letter, a newsletter, plus any custom
//! format defined by a prompt template) with an LLM backend.
//!
//! ## Core Concepts
//!
//! - **[`Backend`]**: object-safe trait over LLM providers. Takes a
//!   [`BackendCallSpec`] and returns the raw completion text.
//!   [`OpenAiBackend`] covers OpenAI and OpenRouter, [`OllamaBackend`] a
//!   local Ollama server, [`MockBackend`] tests.
//! - **[`TemplateStore`]**: per-format system and user prompts, loaded from
//!   YAML with one `{input_text}` slot per user template.
//! - **[`FormatGenerator`]**: builds the call for one format, applies its
//!   generation defaults and post-processes the reply.
//! - **[`Orchestrator`]**: fans a [`GenerationRequest`] out to every
//!   requested format with bounded concurrency and collects a
//!   [`GenerationResult`]. One format failing never fails the others.
//!
//! ## Quick Start
//!
//! ```no_run
//! use content_formats::{GenerationRequest, Orchestrator, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let orchestrator = settings
//!         .orchestrator_builder()?
//!         .sink(std::sync::Arc::new(settings.file_sink()))
//!         .build()?;
//!
//!     let request = GenerationRequest::new(
//!         "Company X launches a new product",
//!         ["chat_post", "email"],
//!     );
//!     let result = orchestrator.run(&request).await?;
//!     for (format, outcome) in result.iter() {
//!         match &outcome.content {
//!             Some(text) => println!("== {} ==\n{}", format, text),
//!             None => eprintln!("{} failed: {:?}", format, outcome.error_detail),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a provider
//!
//! ```
//! use content_formats::{GenerationRequest, MockBackend, Orchestrator};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let orchestrator = Orchestrator::builder()
//!     .backend(Arc::new(MockBackend::fixed("Big news today!")))
//!     .build()
//!     .unwrap();
//!
//! let result = orchestrator
//!     .run(&GenerationRequest::new("Company X launches", ["chat_post", "fax"]))
//!     .await
//!     .unwrap();
//! assert_eq!(result.content("chat_post"), Some("Big news today!"));
//! assert!(result.content("fax").is_none());
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod formats;
pub mod generator;
pub mod orchestrator;
pub mod sink;
pub mod templates;
pub mod types;

pub use backend::{
    Backend, BackendCallSpec, BackoffConfig, MockBackend, OllamaBackend, OpenAiBackend,
};
pub use config::{build_backend, ProviderKind, Settings};
pub use error::{GenerationError, Result};
pub use formats::{FormatInfo, FormatKind, FormatRegistry};
pub use generator::FormatGenerator;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use sink::{FileFormat, FileSink, OutputSink};
pub use templates::{PromptTemplate, TemplateStore};
pub use types::{
    FormatOutcome, GenerationOptions, GenerationRequest, GenerationResult, OutputRecord,
};
