//! Core data model: analysis feedback and the persisted prescription record.
//!
//! The wire format is fixed: records already in user stores use camelCase
//! keys (`prescriptionPath`, `sideEffects`, `overallScore`, …), so every
//! type here carries `#[serde(rename_all = "camelCase")]` and must keep
//! round-tripping those documents unchanged.
//!
//! [`Feedback`] is the normalized six-category assessment. Its invariant —
//! all six categories always present, scores in [0, 100] — is established
//! by [`crate::pipeline::normalize`]; the types here just hold the result.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier for one analysis session / persisted record.
///
/// Random (UUID v4), never sequential; collisions are not a practical
/// concern over the lifetime of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string (e.g. from a URL or CLI argument).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The key this record is persisted under in the key-value store.
    pub fn kv_key(&self) -> String {
        format!("prescription:{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a tip is a positive observation or an improvement suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipKind {
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "improve")]
    Improve,
}

/// One observation or suggestion within a feedback category.
///
/// `explanation` is only meaningful for improvement suggestions, but the
/// schema does not enforce that — providers attach explanations to positive
/// tips too and they are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Score and tips for a single assessment category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeedback {
    /// Integer score in [0, 100]. 0 after a degraded run.
    pub score: u8,
    /// Display-ordered tips; empty after a degraded run.
    #[serde(default)]
    pub tips: Vec<Tip>,
}

/// The normalized six-category prescription assessment.
///
/// After normalization all six categories are always present — a degraded
/// run yields `Feedback::default()` (every score 0, every tip list empty)
/// rather than an absent or partial value, so rendering code never
/// special-cases missing feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default)]
    pub overall_score: u8,
    pub medications: CategoryFeedback,
    pub dosage: CategoryFeedback,
    pub instructions: CategoryFeedback,
    pub side_effects: CategoryFeedback,
    pub lifestyle: CategoryFeedback,
    pub health_compliance: CategoryFeedback,
}

impl Feedback {
    /// All category entries in display order, with their wire-format names.
    pub fn categories(&self) -> [(&'static str, &CategoryFeedback); 6] {
        [
            ("medications", &self.medications),
            ("dosage", &self.dosage),
            ("instructions", &self.instructions),
            ("sideEffects", &self.side_effects),
            ("lifestyle", &self.lifestyle),
            ("healthCompliance", &self.health_compliance),
        ]
    }

    /// True when every score is zero and every tip list empty — the shape a
    /// degraded run produces.
    pub fn is_all_zero(&self) -> bool {
        self.overall_score == 0
            && self
                .categories()
                .iter()
                .all(|(_, c)| c.score == 0 && c.tips.is_empty())
    }
}

/// One persisted analysis record.
///
/// Created exactly once per pipeline run and immutable thereafter;
/// destroyed only by the bulk wipe. The blob-store paths are handles into
/// the external store, not owned data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRecord {
    pub id: RecordId,
    /// Blob-store path of the original uploaded document.
    pub prescription_path: String,
    /// Blob-store path of the rasterised preview image.
    pub image_path: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    pub feedback: Feedback,
    /// Raw provider text (or a failure description), kept for audit display
    /// alongside the structured feedback.
    #[serde(default)]
    pub ai_response: String,
}

/// User settings persisted under the `settings` key and included in the
/// export snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "Settings::default_language")]
    pub language: String,
    #[serde(default = "Settings::default_notifications")]
    pub notifications: bool,
}

impl Settings {
    fn default_language() -> String {
        "English".to_string()
    }

    fn default_notifications() -> bool {
        true
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            language: Self::default_language(),
            notifications: true,
        }
    }
}
