use crate::error::{GenerationError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Per-call overrides applied on top of each format's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Completion length cap in tokens (positive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(GenerationError::InvalidRequest(format!(
                    "temperature {} outside 0.0-1.0",
                    t
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(GenerationError::InvalidRequest(
                "max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// A single caller request spanning one or more formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The free text every format is generated from.
    pub input_text: String,

    /// Requested format ids, in the order results should be reported.
    pub format_ids: Vec<String>,

    #[serde(default)]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new<I, S>(input_text: impl Into<String>, format_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input_text: input_text.into(),
            format_ids: format_ids.into_iter().map(Into::into).collect(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Requested ids with duplicates removed, first occurrence wins.
    pub fn unique_format_ids(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.format_ids.len());
        for id in &self.format_ids {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
        seen
    }

    /// Reject malformed top-level input before any per-format work starts.
    pub fn validate(&self) -> Result<()> {
        if self.input_text.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "input text must not be empty".into(),
            ));
        }
        if self.format_ids.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "at least one format must be requested".into(),
            ));
        }
        self.options.validate()
    }
}

/// The outcome for one format: content on success, an error detail otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatOutcome {
    pub content: Option<String>,
    pub error_detail: Option<String>,
}

impl FormatOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            error_detail: None,
        }
    }

    pub fn failure(error: &GenerationError) -> Self {
        Self {
            content: None,
            error_detail: Some(error.detail()),
        }
    }

    /// The isolation boundary: any per-format error becomes a failed entry.
    pub fn from_result(result: Result<String>) -> Self {
        match result {
            Ok(content) => Self::success(content),
            Err(e) => Self::failure(&e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.content.is_some()
    }
}

/// One entry per requested format, in request order.
///
/// Serializes as a JSON object keyed by format id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    entries: Vec<(String, FormatOutcome)>,
}

impl GenerationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the outcome for `format_id`, keeping its position.
    pub fn insert(&mut self, format_id: impl Into<String>, outcome: FormatOutcome) {
        let format_id = format_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == format_id) {
            Some((_, existing)) => *existing = outcome,
            None => self.entries.push((format_id, outcome)),
        }
    }

    pub fn get(&self, format_id: &str) -> Option<&FormatOutcome> {
        self.entries
            .iter()
            .find(|(id, _)| id == format_id)
            .map(|(_, outcome)| outcome)
    }

    /// Content for `format_id`, if that format succeeded.
    pub fn content(&self, format_id: &str) -> Option<&str> {
        self.get(format_id).and_then(|o| o.content.as_deref())
    }

    pub fn format_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatOutcome)> {
        self.entries.iter().map(|(id, o)| (id.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Error details of the failed formats.
    pub fn errors(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .filter_map(|(id, o)| o.error_detail.as_deref().map(|e| (id.as_str(), e)))
            .collect()
    }
}

impl Serialize for GenerationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, outcome) in &self.entries {
            map.serialize_entry(id, outcome)?;
        }
        map.end()
    }
}

/// What the sink persists for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    pub input_text: String,
    pub formats: Vec<String>,
    pub results: GenerationResult,
    /// `None` when every format succeeded.
    pub errors: Option<BTreeMap<String, String>>,
    /// RFC 3339 timestamp of batch completion.
    pub timestamp: String,
}

impl OutputRecord {
    pub fn new(request: &GenerationRequest, results: &GenerationResult) -> Self {
        let errors: BTreeMap<String, String> = results
            .errors()
            .into_iter()
            .map(|(id, e)| (id.to_string(), e.to_string()))
            .collect();
        Self {
            input_text: request.input_text.clone(),
            formats: results.format_ids().into_iter().map(str::to_string).collect(),
            results: results.clone(),
            errors: if errors.is_empty() { None } else { Some(errors) },
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}
