//! Pulling code and JSON out of free-form model replies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{UnitError, UnitResult};

fn python_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```python\s*\n(.*?)\n```").expect("valid regex"))
}

fn bare_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*\n(.*?)\n```").expect("valid regex"))
}

fn tagged_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\w*\s*(.*?)\n```").expect("valid regex"))
}

/// Extract code from a model reply.
///
/// Tries, in order: the first ```python block, the first bare ``` block,
/// the first block with any language tag, and finally the whole reply.
pub fn extract_code(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    for re in [python_fence(), bare_fence(), tagged_fence()] {
        if let Some(body) = re.captures(text).and_then(|c| c.get(1)) {
            return body.as_str().trim().to_string();
        }
    }
    text.to_string()
}

/// Parse a JSON value out of a model reply.
///
/// Accepts bare JSON, JSON inside a fenced block, or JSON surrounded by
/// prose (outermost `{ ... }`).
pub fn extract_json(text: &str) -> UnitResult<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Err(UnitError::malformed("empty reply where JSON was expected"));
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    let fenced = extract_code(text);
    if let Ok(value) = serde_json::from_str(&fenced) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(UnitError::malformed("reply is not valid JSON"))
}
