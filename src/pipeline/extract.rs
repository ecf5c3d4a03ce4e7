//! Feedback extraction: locate the JSON payload text in a provider response.
//!
//! Two separate concerns, two separate failures:
//!
//! * **Shape** — the response's polymorphic content (string, part array,
//!   top-level fallback) must yield a single text. Failure here is
//!   [`AnalysisError::Extraction`]: there was nothing recognisable to read.
//! * **Decoration** — models wrap payloads in ```` ```json ```` fences
//!   despite being told not to. Stripping the fence is lossless; text
//!   without a fence passes through unchanged. Whether the result is valid
//!   JSON is the normalizer's question, reported as a distinct
//!   [`AnalysisError::Parse`].

use crate::error::AnalysisError;
use crate::pipeline::provider::{ContentPart, MessageContent, ProviderResponse};
use once_cell::sync::Lazy;
use regex::Regex;

/// Pull the feedback text out of a provider response.
///
/// Checks `message.content` first, then the top-level `content` fallback.
/// Part arrays contribute their first textual part — providers that split
/// a payload across parts put the JSON in the first one.
pub fn feedback_text(response: &ProviderResponse) -> Result<String, AnalysisError> {
    let content = response
        .message
        .as_ref()
        .and_then(|m| m.content.as_ref())
        .or(response.content.as_ref())
        .ok_or_else(|| AnalysisError::Extraction {
            detail: "response has neither message.content nor content".into(),
        })?;

    match content {
        MessageContent::Text(text) => Ok(text.clone()),
        MessageContent::Parts(parts) => parts
            .first()
            .map(|part| match part {
                ContentPart::Text(text) => text.clone(),
                ContentPart::Object { text } => text.clone(),
            })
            .ok_or_else(|| AnalysisError::Extraction {
                detail: "content array is empty".into(),
            }),
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

/// Strip a ```` ```json ```` fence if present; plain text passes through.
///
/// Only fences explicitly labelled `json` are stripped — an unlabelled or
/// differently-labelled fence is left alone rather than guessed at.
pub fn strip_json_fence(text: &str) -> &str {
    match RE_JSON_FENCE.captures(text) {
        Some(caps) => caps.get(1).map_or(text, |m| m.as_str()),
        None => text,
    }
}
