//! Progress-callback trait for pipeline stage transitions.
//!
//! Inject an [`Arc<dyn AnalysisProgress>`] via
//! [`crate::config::AnalysisConfigBuilder::progress`] to receive an event at
//! every stage transition of the analysis pipeline, each carrying a
//! human-readable status string suitable for direct display.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a WebSocket, or a terminal spinner
//! without the library knowing anything about how the host application
//! communicates. The trait is `Send + Sync` so it crosses task boundaries.

use std::sync::Arc;

/// The states of one pipeline run, in the order they are normally entered.
///
/// `Degrading` replaces `Normalizing` when the analysis step failed; both
/// proceed to `Persisting`. `Done` is the only terminal state reachable once
/// the initial upload has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Uploading,
    Converting,
    UploadingPreview,
    Analyzing,
    Normalizing,
    Degrading,
    Persisting,
    Done,
}

impl PipelineStage {
    /// Status line shown to the user while this stage runs.
    pub fn status_text(&self) -> &'static str {
        match self {
            PipelineStage::Uploading => "Uploading the file...",
            PipelineStage::Converting => "Converting to image...",
            PipelineStage::UploadingPreview => "Uploading the image...",
            PipelineStage::Analyzing => "Analyzing...",
            PipelineStage::Normalizing => "Reading analysis results...",
            PipelineStage::Degrading => "Analysis unavailable, saving anyway...",
            PipelineStage::Persisting => "Saving...",
            PipelineStage::Done => "Done",
        }
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages are fired sequentially from a single task;
/// implementations still must be `Send + Sync` to cross the async boundary.
pub trait AnalysisProgress: Send + Sync {
    /// Called on entry to each stage.
    fn on_stage(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// Called when the analysis step failed and the run degrades to default
    /// feedback. Always followed by `on_stage(Persisting)`.
    fn on_degraded(&self, reason: &str) {
        let _ = reason;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl AnalysisProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgress>;
