//! Prompt template store.
//!
//! Templates are defined in YAML as a mapping from format id to a
//! `{ system, user, description? }` record. The user template must contain
//! exactly one `{input_text}` slot; `{{` and `}}` produce literal braces.
//!
//! ```yaml
//! chat_post:
//!   description: Short chat-platform post
//!   system: You write short posts.
//!   user: "Write a post about: {input_text}"
//! ```

use crate::error::{GenerationError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Placeholder substituted with the caller's input text.
pub const INPUT_PLACEHOLDER: &str = "{input_text}";

/// Templates compiled into the crate.
const BUILTIN_TEMPLATES: &str = include_str!("../prompts/prompts.yaml");

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// The fixed prompt skeleton of one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub format_id: String,
    pub system_text: String,
    pub user_template: String,
    /// Human-readable summary shown in the format catalog.
    pub description: Option<String>,
}

impl PromptTemplate {
    /// Fill the `{input_text}` slot by direct interpolation.
    ///
    /// `input_text` is not escaped: text that itself contains `{input_text}`
    /// is inserted verbatim.
    ///
    /// ```
    /// use content_formats::templates::PromptTemplate;
    ///
    /// let t = PromptTemplate {
    ///     format_id: "demo".into(),
    ///     system_text: "sys".into(),
    ///     user_template: "News: {input_text} as JSON {{\"k\": 1}}".into(),
    ///     description: None,
    /// };
    /// assert_eq!(t.render("launch"), r#"News: launch as JSON {"k": 1}"#);
    /// ```
    pub fn render(&self, input_text: &str) -> String {
        // Pass 1: protect escaped braces
        let mut rendered = self.user_template.replace("{{", ESCAPE_SENTINEL);
        rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

        // Pass 2: substitute the slot
        rendered = rendered.replacen(INPUT_PLACEHOLDER, input_text, 1);

        // Pass 3: restore escaped braces
        rendered = rendered.replace(ESCAPE_SENTINEL, "{");
        rendered.replace(ESCAPE_SENTINEL_CLOSE, "}")
    }

    fn slot_count(user_template: &str) -> usize {
        user_template
            .replace("{{", ESCAPE_SENTINEL)
            .replace("}}", ESCAPE_SENTINEL_CLOSE)
            .matches(INPUT_PLACEHOLDER)
            .count()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDef {
    system: String,
    user: String,
    #[serde(default)]
    description: Option<String>,
}

/// Read-only store of every prompt template, loaded eagerly.
///
/// Build it once at startup and share it (it is `Send + Sync` and never
/// mutated after load).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStore {
    templates: Vec<PromptTemplate>,
}

impl TemplateStore {
    /// Load the templates embedded in the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_TEMPLATES)
    }

    /// Load templates from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            GenerationError::TemplateLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let store = Self::from_yaml_str(&source)?;
        info!(path = %path.display(), count = store.len(), "prompt templates loaded");
        Ok(store)
    }

    /// Parse and validate a YAML definition source.
    ///
    /// Fails with [`GenerationError::TemplateLoad`] on invalid YAML, a
    /// non-mapping document, empty prompt text, or a user template without
    /// exactly one `{input_text}` slot.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(source)
            .map_err(|e| GenerationError::TemplateLoad(format!("invalid YAML: {}", e)))?;

        let mut templates = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let format_id = key
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| GenerationError::TemplateLoad(format!("non-string format id: {:?}", key)))?;

            let def: TemplateDef = serde_yaml::from_value(value).map_err(|e| {
                GenerationError::TemplateLoad(format!("format '{}': {}", format_id, e))
            })?;

            if def.system.trim().is_empty() || def.user.trim().is_empty() {
                return Err(GenerationError::TemplateLoad(format!(
                    "format '{}': system and user prompts must not be empty",
                    format_id
                )));
            }

            let slots = PromptTemplate::slot_count(&def.user);
            if slots != 1 {
                return Err(GenerationError::TemplateLoad(format!(
                    "format '{}': user prompt must contain exactly one {} slot, found {}",
                    format_id, INPUT_PLACEHOLDER, slots
                )));
            }

            templates.push(PromptTemplate {
                format_id,
                system_text: def.system.trim().to_string(),
                user_template: def.user.trim().to_string(),
                description: def.description,
            });
        }

        Ok(Self { templates })
    }

    /// Look up the template for a format.
    pub fn get(&self, format_id: &str) -> Result<&PromptTemplate> {
        self.templates
            .iter()
            .find(|t| t.format_id == format_id)
            .ok_or_else(|| GenerationError::UnknownFormat {
                format_id: format_id.to_string(),
                available: self.format_ids().join(", "),
            })
    }

    /// Format ids in definition order.
    pub fn format_ids(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.format_id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
teaser:
  description: One-line teaser
  system: You write teasers.
  user: "Tease this: {input_text}"
digest:
  system: You write digests.
  user: |
    Summarize:
    {input_text}
"#;

    #[test]
    fn test_builtin_templates_load() {
        let store = TemplateStore::builtin().unwrap();
        assert_eq!(
            store.format_ids(),
            vec!["chat_post", "email", "official_letter", "newsletter"]
        );
        let email = store.get("email").unwrap();
        assert!(email.system_text.contains("Subject:"));
        assert!(email.user_template.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_loading_is_idempotent() {
        let first = TemplateStore::from_yaml_str(SAMPLE).unwrap();
        let second = TemplateStore::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(first, second);
        assert_eq!(TemplateStore::builtin().unwrap(), TemplateStore::builtin().unwrap());
    }

    #[test]
    fn test_get_unknown_format() {
        let store = TemplateStore::from_yaml_str(SAMPLE).unwrap();
        let err = store.get("haiku").unwrap_err();
        assert_eq!(err.kind(), "UnknownFormatError");
        assert!(err.to_string().contains("teaser, digest"));
    }

    #[test]
    fn test_render_substitutes_once() {
        let store = TemplateStore::from_yaml_str(SAMPLE).unwrap();
        let teaser = store.get("teaser").unwrap();
        assert_eq!(teaser.render("Company X launches"), "Tease this: Company X launches");
        assert_eq!(teaser.description.as_deref(), Some("One-line teaser"));
    }

    #[test]
    fn test_render_leaves_input_braces_alone() {
        let store = TemplateStore::from_yaml_str(SAMPLE).unwrap();
        let teaser = store.get("teaser").unwrap();
        assert_eq!(teaser.render("{{x}}"), "Tease this: {{x}}");
    }

    #[test]
    fn test_invalid_yaml_fails_fast() {
        let err = TemplateStore::from_yaml_str("chat_post: [unclosed").unwrap_err();
        assert_eq!(err.kind(), "TemplateLoadError");
    }

    #[test]
    fn test_missing_slot_rejected() {
        let source = "x:\n  system: s\n  user: no slot here\n";
        let err = TemplateStore::from_yaml_str(source).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_double_slot_rejected() {
        let source = "x:\n  system: s\n  user: \"{input_text} and {input_text}\"\n";
        assert!(TemplateStore::from_yaml_str(source).is_err());
    }

    #[test]
    fn test_escaped_slot_does_not_count() {
        let source = "x:\n  system: s\n  user: \"{{input_text}} then {input_text}\"\n";
        let store = TemplateStore::from_yaml_str(source).unwrap();
        assert_eq!(store.get("x").unwrap().render("news"), "{input_text} then news");
    }

    #[test]
    fn test_empty_system_rejected() {
        let source = "x:\n  system: \"  \"\n  user: \"{input_text}\"\n";
        assert!(TemplateStore::from_yaml_str(source).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let source = "x:\n  system: s\n  user: \"{input_text}\"\n  temperature: 0.3\n";
        assert!(TemplateStore::from_yaml_str(source).is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = TemplateStore::from_path("/nonexistent/prompts.yaml").unwrap_err();
        assert_eq!(err.kind(), "TemplateLoadError");
    }
}
