//! Tolerant JSON extraction from free-form LLM output.
//!
//! Accepts Markdown fences and prose around the payload, but only ever parses the first
//! balanced top-level object, and only within [`MAX_RESPONSE_BYTES`].

use std::collections::BTreeMap;
use thiserror::Error;

pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("response exceeds {limit} bytes ({size})")]
    TooLarge { size: usize, limit: usize },

    #[error("no JSON object found in response")]
    NoJsonFound,

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("expected a JSON object mapping transaction IDs to explanations")]
    NotAnObject,
}

/// Drop Markdown code fence lines (```` ``` ```` or ```` ```json ````), keep everything else.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte span of the first balanced `{...}`, ignoring braces inside strings.
fn first_object_span(text: &str) -> Result<(usize, usize), ExtractError> {
    let start = text.find('{').ok_or(ExtractError::NoJsonFound)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    Err(ExtractError::MalformedJson("unbalanced braces".into()))
}

/// Parse an `{id: explanation}` object out of raw model output. Non-string values are
/// kept as their JSON text.
pub fn extract_explanations(raw: &str) -> Result<BTreeMap<String, String>, ExtractError> {
    if raw.len() > MAX_RESPONSE_BYTES {
        return Err(ExtractError::TooLarge {
            size: raw.len(),
            limit: MAX_RESPONSE_BYTES,
        });
    }
    let cleaned = strip_code_fences(raw);
    if cleaned.trim_start().starts_with('[') {
        return Err(ExtractError::NotAnObject);
    }
    let (start, end) = first_object_span(&cleaned)?;
    let value: serde_json::Value = serde_json::from_str(&cleaned[start..end])
        .map_err(|e| ExtractError::MalformedJson(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(ExtractError::NotAnObject);
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}
