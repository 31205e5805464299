//! Output formats: generation defaults, post-processing rules, and the
//! registry that maps format ids to them.
//!
//! | Format            | Temperature | Max tokens | Shape rule                              |
//! |-------------------|-------------|------------|-----------------------------------------|
//! | `chat_post`       | 0.8         | 200        | plain text, at most 300 characters      |
//! | `email`           | 0.7         | 300        | `Subject:` line followed by a body      |
//! | `official_letter` | 0.5         | 600        | non-empty; placeholders checked (warn)  |
//! | `newsletter`      | 0.7         | 500        | non-empty, blank lines collapsed        |
//! | custom            | 0.7         | 1024       | non-empty                               |

pub mod cleanup;

use crate::error::{GenerationError, Result};
use crate::templates::TemplateStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Maximum length of a chat post, in characters.
pub const CHAT_POST_MAX_CHARS: usize = 300;

/// Placeholders an official letter is expected to carry.
pub const LETTER_PLACEHOLDERS: &[&str] = &["[SENDER]", "[RECIPIENT]", "[DATE]"];

static SUBJECT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:subject|тема)[ \t]*:[ \t]*\S").expect("valid regex"));
static SUBJECT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:subject|тема)[ \t]*:[ \t]*").expect("valid regex"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?…](?:\s+|$)").expect("valid regex"));

/// The closed set of format behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    ChatPost,
    Email,
    OfficialLetter,
    Newsletter,
    /// A template-only format with no dedicated rules.
    Custom,
}

impl FormatKind {
    /// Built-in formats with their canonical ids, in catalog order.
    pub const BUILTIN: [(&'static str, FormatKind); 4] = [
        ("chat_post", FormatKind::ChatPost),
        ("email", FormatKind::Email),
        ("official_letter", FormatKind::OfficialLetter),
        ("newsletter", FormatKind::Newsletter),
    ];

    pub fn default_temperature(self) -> f64 {
        match self {
            FormatKind::ChatPost => 0.8,
            FormatKind::Email => 0.7,
            FormatKind::OfficialLetter => 0.5,
            FormatKind::Newsletter => 0.7,
            FormatKind::Custom => 0.7,
        }
    }

    pub fn default_max_tokens(self) -> u32 {
        match self {
            FormatKind::ChatPost => 200,
            FormatKind::Email => 300,
            FormatKind::OfficialLetter => 600,
            FormatKind::Newsletter => 500,
            FormatKind::Custom => 1024,
        }
    }

    /// Turn raw model output into the presentable artifact.
    ///
    /// Fails with [`GenerationError::Validation`] when the output cannot be
    /// made to satisfy the format's minimal shape.
    pub fn post_process(self, format_id: &str, raw: &str) -> Result<String> {
        let cleaned = cleanup::clean_common(raw);
        if cleaned.is_empty() {
            return Err(validation(format_id, "output is empty after cleanup"));
        }

        let content = match self {
            FormatKind::ChatPost => chat_post(&cleaned),
            FormatKind::Email => email(format_id, &cleaned)?,
            FormatKind::OfficialLetter => official_letter(format_id, &cleaned),
            FormatKind::Newsletter | FormatKind::Custom => cleanup::collapse_blank_lines(&cleaned),
        };

        if content.trim().is_empty() {
            return Err(validation(format_id, "output is empty after post-processing"));
        }
        Ok(content)
    }
}

fn validation(format_id: &str, reason: impl Into<String>) -> GenerationError {
    GenerationError::Validation {
        format_id: format_id.to_string(),
        reason: reason.into(),
    }
}

fn chat_post(text: &str) -> String {
    let plain = cleanup::strip_markup(text);
    let collapsed = cleanup::collapse_blank_lines(&plain);
    truncate_on_sentence(collapsed.trim(), CHAT_POST_MAX_CHARS)
}

/// Cut `text` to at most `max_chars` characters, preferring the last sentence
/// boundary that fits. Falls back to a hard cut ending in an ellipsis.
pub fn truncate_on_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    warn!(
        length = text.chars().count(),
        max_chars, "chat post exceeds the length cap, truncating"
    );

    let fitting_end = SENTENCE_END
        .find_iter(text)
        .map(|m| m.start() + m.as_str().trim_end().len())
        .take_while(|&end| text[..end].chars().count() <= max_chars)
        .last();

    match fitting_end {
        Some(end) => text[..end].trim_end().to_string(),
        None => {
            let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
            cut = cut.trim_end().to_string();
            cut.push('…');
            cut
        }
    }
}

fn email(format_id: &str, text: &str) -> Result<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    if SUBJECT_LINE.is_match(text) {
        if lines.len() < 2 {
            return Err(validation(format_id, "email has a subject line but no body"));
        }
        return Ok(cleanup::collapse_blank_lines(text));
    }

    // No explicit subject: promote the first line when a body follows.
    match lines.split_first() {
        Some((first, rest)) if !rest.is_empty() => {
            let plain = cleanup::strip_markup(first);
            let subject = SUBJECT_LABEL.replace(plain.trim(), "").trim().to_string();
            if subject.is_empty() {
                return Err(validation(format_id, "email subject line is empty"));
            }
            let body_start = text.find(first).map(|i| i + first.len()).unwrap_or(0);
            let body = cleanup::collapse_blank_lines(text[body_start..].trim());
            Ok(format!("Subject: {}\n\n{}", subject, body))
        }
        _ => Err(validation(format_id, "email needs a subject line and a body")),
    }
}

fn official_letter(format_id: &str, text: &str) -> String {
    for placeholder in LETTER_PLACEHOLDERS {
        if !text.contains(placeholder) {
            warn!(format = %format_id, %placeholder, "placeholder missing from official letter");
        }
    }
    cleanup::collapse_blank_lines(text)
}

/// One entry of the format catalog exposed to front-ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatInfo {
    pub id: String,
    pub kind: FormatKind,
    pub description: Option<String>,
    pub builtin: bool,
}

/// Maps format ids to their [`FormatKind`].
///
/// Built once at startup from the built-in formats that have a template,
/// plus every other template in the store as a [`FormatKind::Custom`] format.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    entries: Vec<(String, FormatKind)>,
}

impl FormatRegistry {
    /// Register every template in `store`.
    pub fn from_store(store: &TemplateStore) -> Self {
        let entries = store
            .iter()
            .map(|t| {
                let kind = FormatKind::BUILTIN
                    .iter()
                    .find(|(id, _)| *id == t.format_id)
                    .map(|(_, kind)| *kind)
                    .unwrap_or(FormatKind::Custom);
                (t.format_id.clone(), kind)
            })
            .collect();
        Self { entries }
    }

    pub fn resolve(&self, format_id: &str) -> Result<FormatKind> {
        self.entries
            .iter()
            .find(|(id, _)| id == format_id)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| GenerationError::UnknownFormat {
                format_id: format_id.to_string(),
                available: self.ids().join(", "),
            })
    }

    pub fn contains(&self, format_id: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == format_id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Ids of the built-in formats that are registered.
    pub fn builtin_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, kind)| *kind != FormatKind::Custom)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// The catalog, with descriptions taken from the templates.
    pub fn catalog(&self, store: &TemplateStore) -> Vec<FormatInfo> {
        self.entries
            .iter()
            .map(|(id, kind)| FormatInfo {
                id: id.clone(),
                kind: *kind,
                description: store.get(id).ok().and_then(|t| t.description.clone()),
                builtin: *kind != FormatKind::Custom,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_format() {
        assert_eq!(FormatKind::ChatPost.default_temperature(), 0.8);
        assert_eq!(FormatKind::ChatPost.default_max_tokens(), 200);
        assert_eq!(FormatKind::OfficialLetter.default_temperature(), 0.5);
        assert_eq!(FormatKind::Newsletter.default_max_tokens(), 500);
    }

    #[test]
    fn test_chat_post_strips_markup() {
        let out = FormatKind::ChatPost
            .post_process("chat_post", "**Big news!** Company X launches a product 🚀")
            .unwrap();
        assert_eq!(out, "Big news! Company X launches a product 🚀");
    }

    #[test]
    fn test_chat_post_truncates_on_sentence_boundary() {
        let sentence = "Company X just launched its new product today. ";
        let raw = sentence.repeat(10);
        let out = FormatKind::ChatPost.post_process("chat_post", &raw).unwrap();
        assert!(out.chars().count() <= CHAT_POST_MAX_CHARS);
        assert!(out.ends_with('.'));
        assert_eq!(out, sentence.repeat(6).trim_end());
    }

    #[test]
    fn test_chat_post_hard_cut_without_sentences() {
        let raw = "word ".repeat(100);
        let out = FormatKind::ChatPost.post_process("chat_post", &raw).unwrap();
        assert!(out.chars().count() <= CHAT_POST_MAX_CHARS);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let text = "Ж".repeat(CHAT_POST_MAX_CHARS);
        assert_eq!(truncate_on_sentence(&text, CHAT_POST_MAX_CHARS), text);
    }

    #[test]
    fn test_empty_output_is_validation_error() {
        let err = FormatKind::Newsletter
            .post_process("newsletter", "  <think>hmm</think>  ")
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_email_with_subject_kept() {
        let raw = "Subject: Launch day\n\n\n\nHi all,\nWe launched.";
        let out = FormatKind::Email.post_process("email", raw).unwrap();
        assert_eq!(out, "Subject: Launch day\n\nHi all,\nWe launched.");
    }

    #[test]
    fn test_email_first_line_promoted_to_subject() {
        let raw = "**Launch day**\n\nHi all,\nWe launched.";
        let out = FormatKind::Email.post_process("email", raw).unwrap();
        assert_eq!(out, "Subject: Launch day\n\nHi all,\nWe launched.");
    }

    #[test]
    fn test_email_single_line_rejected() {
        let err = FormatKind::Email
            .post_process("email", "We launched.")
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation { .. }));
    }

    #[test]
    fn test_email_subject_without_body_rejected() {
        assert!(FormatKind::Email
            .post_process("email", "Subject: Launch")
            .is_err());
    }

    #[test]
    fn test_email_empty_subject_label_rejected() {
        let err = FormatKind::Email
            .post_process("email", "Subject:

Hi all,
We launched.")
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_email_marked_up_subject_label_not_doubled() {
        let out = FormatKind::Email
            .post_process("email", "**Subject:** Launch day

Hi all,
We launched.")
            .unwrap();
        assert_eq!(out, "Subject: Launch day

Hi all,
We launched.");
    }

    #[test]
    fn test_official_letter_keeps_text_when_placeholders_missing() {
        let out = FormatKind::OfficialLetter
            .post_process("official_letter", "Dear Sir,\n\nWe inform you.")
            .unwrap();
        assert_eq!(out, "Dear Sir,\n\nWe inform you.");
    }

    #[test]
    fn test_registry_from_builtin_store() {
        let store = TemplateStore::builtin().unwrap();
        let registry = FormatRegistry::from_store(&store);
        assert_eq!(registry.resolve("email").unwrap(), FormatKind::Email);
        assert_eq!(registry.builtin_ids().len(), 4);
        let err = registry.resolve("unknown_format").unwrap_err();
        assert_eq!(err.kind(), "UnknownFormatError");
    }

    #[test]
    fn test_registry_registers_custom_templates() {
        let store = TemplateStore::from_yaml_str(
            "email:\n  system: s\n  user: \"{input_text}\"\nfaq:\n  description: FAQ\n  system: s\n  user: \"{input_text}\"\n",
        )
        .unwrap();
        let registry = FormatRegistry::from_store(&store);
        assert_eq!(registry.ids(), vec!["email", "faq"]);
        assert_eq!(registry.resolve("faq").unwrap(), FormatKind::Custom);
        assert!(!registry.contains("chat_post"));

        let catalog = registry.catalog(&store);
        assert!(catalog[0].builtin);
        assert!(!catalog[1].builtin);
        assert_eq!(catalog[1].description.as_deref(), Some("FAQ"));
    }
}
