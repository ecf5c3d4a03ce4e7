//! Feedback normalization: coerce the payload into the fixed six-category
//! shape, or substitute the deterministic zero default.
//!
//! The invariant downstream code relies on: after normalization, all six
//! category keys exist, every score is an integer in [0, 100], and every tip
//! list is a real (possibly empty) array. No rendering code ever
//! special-cases "missing feedback".
//!
//! Coercion is deliberately two-speed:
//!
//! * **Lenient where safe** — missing categories become zero entries,
//!   out-of-range integer scores clamp, malformed individual tips are
//!   skipped while their well-formed siblings survive.
//! * **Strict where lying is possible** — a payload whose fields carry the
//!   wrong *types* (a string score, a non-array tip list) fails as a whole
//!   and degrades to the default, rather than being creatively reinterpreted.

use crate::error::AnalysisError;
use crate::record::{CategoryFeedback, Feedback, Tip};
use serde::Deserialize;
use serde_json::Value;

/// Raw payload shape, before clamping and tip filtering.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeedback {
    #[serde(default)]
    overall_score: Option<i64>,
    #[serde(default)]
    medications: RawCategory,
    #[serde(default)]
    dosage: RawCategory,
    #[serde(default)]
    instructions: RawCategory,
    #[serde(default)]
    side_effects: RawCategory,
    #[serde(default)]
    lifestyle: RawCategory,
    #[serde(default)]
    health_compliance: RawCategory,
}

#[derive(Debug, Default, Deserialize)]
struct RawCategory {
    #[serde(default)]
    score: i64,
    #[serde(default)]
    tips: Vec<Value>,
}

/// Parse extracted payload text into a well-formed [`Feedback`].
///
/// # Errors
/// [`AnalysisError::Parse`] when the text is not valid JSON or its fields
/// carry the wrong types. Missing categories are not an error — they fill
/// in as zero entries.
pub fn parse_feedback(text: &str) -> Result<Feedback, AnalysisError> {
    let raw: RawFeedback =
        serde_json::from_str(text).map_err(|e| AnalysisError::Parse {
            detail: e.to_string(),
        })?;
    Ok(coerce(raw))
}

/// Normalize possibly-absent payload text, never failing.
///
/// The degrade path in one function: no text, bad JSON, and wrong-typed
/// payloads all collapse to `Feedback::default()`. Running the normalizer
/// on its own default output is a fixed point.
pub fn normalize(text: Option<&str>) -> Feedback {
    match text {
        Some(t) => parse_feedback(t).unwrap_or_default(),
        None => Feedback::default(),
    }
}

fn coerce(raw: RawFeedback) -> Feedback {
    Feedback {
        overall_score: clamp_score(raw.overall_score.unwrap_or(0)),
        medications: coerce_category(raw.medications),
        dosage: coerce_category(raw.dosage),
        instructions: coerce_category(raw.instructions),
        side_effects: coerce_category(raw.side_effects),
        lifestyle: coerce_category(raw.lifestyle),
        health_compliance: coerce_category(raw.health_compliance),
    }
}

fn coerce_category(raw: RawCategory) -> CategoryFeedback {
    CategoryFeedback {
        score: clamp_score(raw.score),
        // Skip tips that fail to deserialize; keep the rest in order.
        tips: raw
            .tips
            .iter()
            .filter_map(|v| serde_json::from_value::<Tip>(v.clone()).ok())
            .collect(),
    }
}

fn clamp_score(v: i64) -> u8 {
    v.clamp(0, 100) as u8
}
