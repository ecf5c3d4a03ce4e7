//! Error types for the mediscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MediScanError`] — **Fatal**: the pipeline run cannot proceed at all
//!   (not authenticated, upload failed, rasterisation failed at every
//!   quality tier). Returned as `Err(MediScanError)` from
//!   [`crate::analyze::Analyzer::analyze`]; nothing is persisted.
//!
//! * [`AnalysisError`] — **Recoverable**: the analysis step failed (provider
//!   timeout, unusable response, malformed payload) but the record is still
//!   persisted with the default zero-score feedback. Stored alongside the
//!   outcome so callers can tell a degraded run from a full one.
//!
//! The separation is the pipeline's central contract: a failure *before* the
//! analysis step loses nothing and is reported to the user; a failure *of*
//! the analysis step downgrades the result but never drops the record.

use thiserror::Error;

/// All fatal errors returned by the mediscan library.
///
/// Analysis-step failures use [`AnalysisError`] and are recovered by the
/// degrade path rather than propagated here.
#[derive(Debug, Error)]
pub enum MediScanError {
    // ── Preconditions ─────────────────────────────────────────────────────
    /// The pipeline requires an authenticated user before running.
    #[error("Not authenticated.\nSign in and retry the analysis.")]
    NotAuthenticated,

    /// The uploaded bytes are not a PDF document.
    #[error("File '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// Storing the original document in the blob store failed.
    #[error("Failed to upload '{name}': {reason}")]
    UploadFailed { name: String, reason: String },

    /// Storing the rasterised preview image in the blob store failed.
    #[error("Failed to upload preview image '{name}': {reason}")]
    PreviewUploadFailed { name: String, reason: String },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// Page 1 could not be rendered at any quality tier.
    #[error(
        "PDF conversion failed at scales {tried_scales:?}: {detail}\n\
         The document may be too large to render. Try a smaller file."
    )]
    ConversionFailed { tried_scales: Vec<f32>, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium to use an existing copy,\n\
or place the platform library alongside the executable."
    )]
    PdfiumBindingFailed(String),

    // ── Provider configuration ────────────────────────────────────────────
    /// No analysis provider is configured and none could be resolved.
    #[error("Analysis provider is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The record write to the key-value store failed.
    #[error("Failed to persist record '{key}': {reason}")]
    PersistFailed { key: String, reason: String },

    /// A store collaborator reported an error outside the persist step.
    #[error("Store error: {0}")]
    Store(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable analysis-step failure.
///
/// Any of these downgrades the run to the default zero-score feedback; the
/// record is persisted regardless. The variant distinguishes *where* the
/// step broke so diagnostics can say "timed out" vs "provider error" vs
/// "response unusable".
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum AnalysisError {
    /// The provider call did not settle within the timeout budget.
    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider reported an error (HTTP failure, API error body).
    #[error("Analysis provider error: {detail}")]
    Provider { detail: String },

    /// The response carried no recognisable text content.
    #[error("No text content in provider response: {detail}")]
    Extraction { detail: String },

    /// Text was found but is not valid feedback JSON.
    #[error("Feedback payload unusable: {detail}")]
    Parse { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_display_lists_scales() {
        let e = MediScanError::ConversionFailed {
            tried_scales: vec![4.0, 2.0],
            detail: "out of memory".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("4.0"), "got: {msg}");
        assert!(msg.contains("2.0"), "got: {msg}");
        assert!(msg.contains("out of memory"));
    }

    #[test]
    fn upload_and_preview_upload_are_distinct() {
        let a = MediScanError::UploadFailed {
            name: "rx.pdf".into(),
            reason: "disk full".into(),
        };
        let b = MediScanError::PreviewUploadFailed {
            name: "rx.png".into(),
            reason: "disk full".into(),
        };
        assert!(a.to_string().contains("rx.pdf"));
        assert!(b.to_string().contains("preview"));
    }

    #[test]
    fn timeout_display() {
        let e = AnalysisError::Timeout { secs: 30 };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn not_a_pdf_shows_magic() {
        let e = MediScanError::NotAPdf {
            name: "notes.txt".into(),
            magic: *b"hell",
        };
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn analysis_error_round_trips_through_serde() {
        let e = AnalysisError::Provider {
            detail: "HTTP 503".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: AnalysisError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AnalysisError::Provider { .. }));
    }
}
