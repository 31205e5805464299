//! Persistence of batch results.
//!
//! The orchestrator hands every finished batch to an [`OutputSink`]. Sink
//! failures are logged by the orchestrator and never reach the caller.
//! [`FileSink`] writes one file per batch under a timestamped name:
//! `output_<YYYYmmdd_HHMMSS>.json` (or `.txt`).

use crate::error::{GenerationError, Result};
use crate::types::OutputRecord;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Destination for finished batches.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist one record.
    async fn persist(&self, record: &OutputRecord) -> Result<()>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// On-disk encoding of a [`FileSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// `=== FORMAT ===` sections, one per format.
    Text,
}

impl FileFormat {
    fn extension(self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Text => "txt",
        }
    }
}

/// Writes each record to its own file in a directory (created on demand).
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    format: FileFormat,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: FileFormat::Json,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `record` under a timestamped name; returns the file path.
    pub async fn save(&self, record: &OutputRecord) -> Result<PathBuf> {
        let stem = format!("output_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        self.save_named(record, &stem).await
    }

    /// Write `record` as `<dir>/<stem>.<ext>`.
    ///
    /// An existing file is never overwritten: `_1`, `_2`, ... is appended to
    /// the stem until the name is free. Names are claimed atomically, so
    /// concurrent saves with the same stem land in distinct files.
    pub async fn save_named(&self, record: &OutputRecord, stem: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| sink_error(&self.dir, e))?;

        let contents = self.encode(record)?;
        let ext = self.format.extension();
        let mut n = 0u32;
        loop {
            let path = if n == 0 {
                self.dir.join(format!("{}.{}", stem, ext))
            } else {
                self.dir.join(format!("{}_{}.{}", stem, n, ext))
            };

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    n += 1;
                    continue;
                }
                Err(e) => return Err(sink_error(&path, e)),
            };

            file.write_all(contents.as_bytes())
                .await
                .map_err(|e| sink_error(&path, e))?;
            file.flush().await.map_err(|e| sink_error(&path, e))?;

            info!(path = %path.display(), "results saved");
            return Ok(path);
        }
    }

    fn encode(&self, record: &OutputRecord) -> Result<String> {
        match self.format {
            FileFormat::Json => serde_json::to_string_pretty(record)
                .map_err(|e| GenerationError::Sink(e.to_string())),
            FileFormat::Text => Ok(render_text(record)),
        }
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn persist(&self, record: &OutputRecord) -> Result<()> {
        self.save(record).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

fn sink_error(path: &Path, err: std::io::Error) -> GenerationError {
    GenerationError::Sink(format!("{}: {}", path.display(), err))
}

/// Plain-text rendering: input first, then one section per format.
pub fn render_text(record: &OutputRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== INPUT ===\n\n{}\n", record.input_text);
    for (id, outcome) in record.results.iter() {
        let _ = writeln!(out, "=== {} ===\n", id.to_uppercase());
        match (&outcome.content, &outcome.error_detail) {
            (Some(content), _) => {
                let _ = writeln!(out, "{}\n", content);
            }
            (None, Some(detail)) => {
                let _ = writeln!(out, "error: {}\n", detail);
            }
            (None, None) => {}
        }
    }
    let _ = writeln!(out, "timestamp: {}", record.timestamp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormatOutcome, GenerationRequest, GenerationResult};

    fn record() -> OutputRecord {
        let request = GenerationRequest::new("Company X launches", ["chat_post", "email"]);
        let mut results = GenerationResult::new();
        results.insert("chat_post", FormatOutcome::success("Launch! 🚀"));
        results.insert(
            "email",
            FormatOutcome::failure(&GenerationError::transport("connection refused")),
        );
        OutputRecord::new(&request, &results)
    }

    #[tokio::test]
    async fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("outputs"));
        let path = sink.save(&record()).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("output_") && name.ends_with(".json"), "{}", name);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["input_text"], "Company X launches");
        assert_eq!(written["results"]["chat_post"]["content"], "Launch! 🚀");
        assert!(written["results"]["email"]["content"].is_null());
        assert!(written["errors"]["email"]
            .as_str()
            .unwrap()
            .starts_with("TransportError"));
    }

    #[tokio::test]
    async fn test_save_named_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let first = sink.save_named(&record(), "batch").await.unwrap();
        let second = sink.save_named(&record(), "batch").await.unwrap();
        assert_eq!(first.file_name().unwrap(), "batch.json");
        assert_eq!(second.file_name().unwrap(), "batch_1.json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_saves_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let rec = record();

        let saves = (0..16).map(|_| sink.save_named(&rec, "same"));
        let paths: Vec<PathBuf> = futures::future::join_all(saves)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), 16);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 16);
        for path in &paths {
            let written: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
            assert_eq!(written["input_text"], "Company X launches");
        }
    }

    #[tokio::test]
    async fn test_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).with_format(FileFormat::Text);
        let path = sink.save_named(&record(), "batch").await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(path.to_string_lossy().ends_with("batch.txt"));
        assert!(text.contains("=== CHAT_POST ===\n\nLaunch! 🚀"));
        assert!(text.contains("=== EMAIL ===\n\nerror: TransportError"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let sink = FileSink::new(blocker.join("nested"));
        let err = sink.persist(&record()).await.unwrap_err();
        assert_eq!(err.kind(), "SinkError");
    }
}
