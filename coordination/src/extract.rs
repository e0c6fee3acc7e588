//! Structured-response extraction.
//!
//! One contract for every call site that expects JSON from a model:
//! strip code fences, take the span from the first `{` to the last `}`,
//! drop control characters, parse, then validate. Tagged and delimited
//! plain-text outputs are handled here too, always with a raw-text fallback.

use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Failure to pull a typed value out of model output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no JSON object found in response")]
    NoJsonObject,

    #[error("JSON parse error: {0}")]
    Parse(String),
}

/// Post-parse validation for structured responses.
pub trait Validate {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` line and a trailing fence.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(newline) => &body[newline + 1..],
            None => body.trim_start_matches('`'),
        };
    }
    if let Some(stripped) = body.trim_end().strip_suffix("```") {
        body = stripped;
    }
    body.trim()
}

/// The substring from the first `{` to the last `}` inclusive.
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Drop ASCII control characters (0x00-0x1F, 0x7F).
pub fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_control()).collect()
}

/// Extract and parse the single JSON object in `text`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ExtractError> {
    let body = strip_code_fences(text);
    let span = json_object_span(body).ok_or(ExtractError::NoJsonObject)?;
    let cleaned = strip_control_chars(span);
    serde_json::from_str(&cleaned).map_err(|e| ExtractError::Parse(e.to_string()))
}

/// [`parse_json`], substituting `default` on failure.
pub fn parse_json_or<T: DeserializeOwned>(text: &str, default: T, context: &str) -> T {
    match parse_json(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(context, error = %e, "Falling back to default for unparsable response");
            default
        }
    }
}

/// Parse a bare integer reply, tolerating surrounding whitespace, quotes,
/// brackets, backticks, and trailing punctuation.
pub fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '[' | ']' | '`'))
        .trim_end_matches(['.', ',', ')'])
        .trim()
        .parse()
        .ok()
}

/// Content between `<tag>` and `</tag>`, case-insensitive, trimmed.
pub fn extract_tagged(text: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<{0}>(.*?)</{0}>", regex::escape(tag));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Text after the first occurrence of `delimiter`, trimmed.
pub fn extract_after_delimiter(text: &str, delimiter: &str) -> Option<String> {
    text.find(delimiter)
        .map(|i| text[i + delimiter.len()..].trim().to_string())
}

/// Tagged content, or the whole trimmed response when the tag is missing.
pub fn tagged_or_raw(text: &str, tag: &str) -> String {
    extract_tagged(text, tag).unwrap_or_else(|| text.trim().to_string())
}

/// Delimited content, or the whole trimmed response when the delimiter is missing.
pub fn delimited_or_raw(text: &str, delimiter: &str) -> String {
    extract_after_delimiter(text, delimiter).unwrap_or_else(|| text.trim().to_string())
}
