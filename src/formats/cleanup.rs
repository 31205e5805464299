//! Text cleanup shared by every format.
//!
//! Models wrap their answer in reasoning blocks, code fences and chatty
//! preambles often enough that every format runs [`clean_common`] before its
//! own rules.

use once_cell::sync::Lazy;
use regex::Regex;

/// Boilerplate openers that end on the same line as the content.
const SIMPLE_PREFIXES: &[&str] = &[
    "Sure! ",
    "Sure, ",
    "Sure.\n",
    "Of course! ",
    "Of course, ",
    "Of course.\n",
    "Certainly! ",
    "Certainly, ",
    "Certainly.\n",
    "Absolutely! ",
    "Absolutely, ",
];

/// Openers that take a whole introductory line ending with a colon.
const LINE_PREFIXES: &[&str] = &["Here's ", "Here is ", "Below is "];

static EXCESS_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__|~~|`").expect("valid regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));
static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?(?:b|i|u|em|strong|p|br|span)\s*/?>").expect("valid regex"));

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks.
///
/// An unclosed block swallows the rest of the text.
///
/// ```
/// use content_formats::formats::cleanup::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        if let Some(end_offset) = result[start..].find(close) {
            let end = start + end_offset + close.len();
            result = format!("{}{}", &result[..start], &result[end..]);
        } else {
            result.truncate(start);
            break;
        }
    }
    result
}

/// If the whole text is one fenced code block, return its body.
pub fn unwrap_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language hint line (possibly empty).
    match body.find('\n') {
        Some(pos) => body[pos + 1..].trim(),
        None => body.trim(),
    }
}

/// Drop a chatty opener such as `"Sure! "` or `"Here is the email:\n"`.
pub fn strip_preamble(text: &str) -> &str {
    for prefix in SIMPLE_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }

    for prefix in LINE_PREFIXES {
        if text.starts_with(prefix) {
            if let Some(pos) = text.find('\n') {
                if text[..pos].trim_end().ends_with(':') {
                    return text[pos + 1..].trim_start();
                }
            }
        }
    }
    text
}

/// Collapse three or more consecutive newlines into a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    EXCESS_BLANK_LINES.replace_all(text, "\n\n").into_owned()
}

/// Remove markdown and inline HTML markup, keeping the visible text.
///
/// ```
/// use content_formats::formats::cleanup::strip_markup;
///
/// assert_eq!(strip_markup("## **Big** news: [site](https://x.io)"), "Big news: site");
/// ```
pub fn strip_markup(text: &str) -> String {
    let text = LINK.replace_all(text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, "");
    EMPHASIS.replace_all(&text, "").into_owned()
}

/// Cleanup applied to every format: reasoning blocks, an enclosing code
/// fence, a chatty preamble, surrounding whitespace.
pub fn clean_common(raw: &str) -> String {
    let without_think = strip_think_tags(raw);
    let unfenced = unwrap_code_fence(&without_think);
    strip_preamble(unfenced).trim().to_string()
}
