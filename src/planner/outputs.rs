//! Tagged-section extraction from model responses.

use std::collections::BTreeMap;

use crate::error::MissingOutputError;

/// Value recorded for an optional section the model left out
pub const NOT_AVAILABLE: &str = "N/A";

/// One section expected in a response, e.g. `<ACTION>...</ACTION>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub key: &'static str,
    pub tag: &'static str,
    pub required: bool,
}

impl OutputSpec {
    pub const fn required(key: &'static str, tag: &'static str) -> Self {
        Self { key, tag, required: true }
    }

    pub const fn optional(key: &'static str, tag: &'static str) -> Self {
        Self { key, tag, required: false }
    }
}

/// Content of the first `<TAG>...</TAG>` pair in `text`, trimmed
pub fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

/// Extract every section in `specs`, keyed by `spec.key`.
///
/// Optional sections that are missing come back as [`NOT_AVAILABLE`].
pub fn extract_outputs(text: &str, specs: &[OutputSpec]) -> Result<BTreeMap<&'static str, String>, MissingOutputError> {
    let mut outputs = BTreeMap::new();
    for spec in specs {
        let value = match extract_tag(text, spec.tag) {
            Some(value) => value.to_string(),
            None if spec.required => {
                return Err(MissingOutputError {
                    tag: spec.tag.to_string(),
                });
            }
            None => NOT_AVAILABLE.to_string(),
        };
        outputs.insert(spec.key, value);
    }
    Ok(outputs)
}

/// Strip a surrounding Markdown code fence, if there is one
pub fn extract_code_block(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json)
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// `None` for the optional-section sentinel
pub fn optional(value: String) -> Option<String> {
    if value == NOT_AVAILABLE { None } else { Some(value) }
}
