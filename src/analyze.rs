//! The pipeline orchestrator: sequence every stage end to end and persist
//! exactly one record per analysis request.
//!
//! ## The failure contract
//!
//! Failures split into two classes (see [`crate::error`]):
//!
//! * Upload, rasterisation, and preview-upload failures are **fatal** — the
//!   run terminates, nothing is persisted, the caller reports the specific
//!   error and the user may resubmit.
//! * Any analysis failure — timeout, provider error, unusable response,
//!   malformed payload — **degrades**: the run substitutes the default
//!   zero-score feedback, persists anyway, and hands back the record
//!   identifier. The user is never left on a dead end because the smart
//!   step failed.
//!
//! ## State machine
//!
//! ```text
//! Uploading → Converting → UploadingPreview → Analyzing ─┬─▶ Normalizing ─▶ Persisting → Done
//!                                                        └─▶ Degrading  ──▶ Persisting → Done
//! ```
//!
//! Every transition fires the progress callback with a displayable status
//! string. `Done` is the only terminal state past a successful upload.

use crate::auth::AuthProvider;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, MediScanError};
use crate::pipeline::client::AnalysisClient;
use crate::pipeline::provider::{AnalysisProvider, OpenRouterProvider};
use crate::pipeline::rasterize::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::{extract, normalize};
use crate::progress::PipelineStage;
use crate::prompts::prepare_instructions;
use crate::record::{Feedback, PrescriptionRecord, RecordId};
use crate::store::{BlobStore, KvStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One user-initiated analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Original file name of the uploaded document (e.g. `rx.pdf`).
    pub file_name: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    pub patient_name: Option<String>,
    pub doctor_name: Option<String>,
    pub symptoms: Option<String>,
}

/// The result of one pipeline run.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// The persisted record; `record.id` addresses the detail view.
    pub record: PrescriptionRecord,
    /// `Some` when the run degraded to default feedback, carrying the
    /// analysis failure that caused it.
    pub degraded: Option<AnalysisError>,
}

/// Orchestrates the analysis pipeline over its collaborators.
pub struct Analyzer {
    auth: Arc<dyn AuthProvider>,
    blobs: Arc<dyn BlobStore>,
    kv: Arc<dyn KvStore>,
    rasterizer: Arc<dyn Rasterizer>,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            auth,
            blobs,
            kv,
            rasterizer: Arc::new(PdfiumRasterizer::new()),
            config,
        }
    }

    /// Swap the rasteriser (tests use [`crate::pipeline::rasterize::MockRasterizer`]).
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Run the full pipeline for one request.
    ///
    /// # Errors
    /// Only fatal errors (see module docs); analysis failures surface as
    /// `AnalysisOutcome::degraded` instead.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisOutcome, MediScanError> {
        if !self.auth.is_authenticated() {
            return Err(MediScanError::NotAuthenticated);
        }

        // Resolve the provider before touching the stores so a missing API
        // key fails the run cleanly with nothing half-uploaded.
        let provider = self.resolve_provider()?;

        let start = Instant::now();
        let id = RecordId::new();
        info!(id = %id, file = %request.file_name, "Starting prescription analysis");

        // ── Step 1: Upload the original document ─────────────────────────
        self.stage(PipelineStage::Uploading);
        let uploaded_file = self
            .blobs
            .upload(&request.file_name, &request.bytes)
            .await
            .map_err(|e| MediScanError::UploadFailed {
                name: request.file_name.clone(),
                reason: e.to_string(),
            })?;

        // ── Step 2: Rasterise page 1 ─────────────────────────────────────
        self.stage(PipelineStage::Converting);
        let preview = self
            .rasterizer
            .rasterize_first_page(
                request.bytes.clone(),
                &request.file_name,
                self.config.primary_scale,
                self.config.fallback_scale,
            )
            .await?;

        // ── Step 3: Upload the preview image ─────────────────────────────
        self.stage(PipelineStage::UploadingPreview);
        let uploaded_image = self
            .blobs
            .upload(&preview.file_name, &preview.png)
            .await
            .map_err(|e| MediScanError::PreviewUploadFailed {
                name: preview.file_name.clone(),
                reason: e.to_string(),
            })?;

        // ── Step 4: Analyze ──────────────────────────────────────────────
        self.stage(PipelineStage::Analyzing);
        let client = AnalysisClient::new(provider, self.config.analysis_timeout_secs);
        let prompt = prepare_instructions(
            request.patient_name.as_deref(),
            request.doctor_name.as_deref(),
            request.symptoms.as_deref(),
        );
        let text_outcome = client
            .analyze(&preview.data_uri(), &prompt)
            .await
            .and_then(|response| extract::feedback_text(&response));

        // ── Step 5: Normalize, or degrade to the zero default ────────────
        let (feedback, ai_response, degraded) = match text_outcome {
            Ok(raw_text) => {
                match normalize::parse_feedback(extract::strip_json_fence(&raw_text)) {
                    Ok(feedback) => {
                        self.stage(PipelineStage::Normalizing);
                        debug!(overall = feedback.overall_score, "Feedback normalized");
                        (feedback, raw_text, None)
                    }
                    Err(e) => {
                        self.degrade(&e);
                        // Keep the provider's text verbatim for diagnostics.
                        (Feedback::default(), raw_text, Some(e))
                    }
                }
            }
            Err(e) => {
                self.degrade(&e);
                (Feedback::default(), format!("Analysis failed: {e}"), Some(e))
            }
        };

        // ── Step 6: Persist exactly once ─────────────────────────────────
        self.stage(PipelineStage::Persisting);
        let record = PrescriptionRecord {
            id: id.clone(),
            prescription_path: uploaded_file.path,
            image_path: uploaded_image.path,
            patient_name: request.patient_name,
            doctor_name: request.doctor_name,
            symptoms: request.symptoms,
            feedback,
            ai_response,
        };

        let key = record.id.kv_key();
        let json = serde_json::to_string(&record)
            .map_err(|e| MediScanError::Internal(format!("Record serialization failed: {e}")))?;
        self.kv
            .set(&key, &json)
            .await
            .map_err(|e| MediScanError::PersistFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        self.stage(PipelineStage::Done);
        info!(
            id = %record.id,
            degraded = degraded.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutcome { record, degraded })
    }

    /// Fetch a persisted record by identifier.
    pub async fn load(&self, id: &RecordId) -> Result<Option<PrescriptionRecord>, MediScanError> {
        let json = self
            .kv
            .get(&id.kv_key())
            .await
            .map_err(|e| MediScanError::Store(e.to_string()))?;
        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| MediScanError::Internal(format!("Stored record unreadable: {e}"))),
            None => Ok(None),
        }
    }

    /// The provider resolution chain: an explicitly configured provider
    /// wins; otherwise OpenRouter is constructed from the environment.
    fn resolve_provider(&self) -> Result<Arc<dyn AnalysisProvider>, MediScanError> {
        if let Some(ref provider) = self.config.provider {
            return Ok(Arc::clone(provider));
        }
        let provider = OpenRouterProvider::from_env(self.config.model_or_default())?
            .with_options(self.config.temperature, self.config.max_tokens);
        Ok(Arc::new(provider))
    }

    fn stage(&self, stage: PipelineStage) {
        debug!(?stage, status = stage.status_text(), "Pipeline stage");
        if let Some(ref cb) = self.config.progress {
            cb.on_stage(stage);
        }
    }

    fn degrade(&self, error: &AnalysisError) {
        warn!(error = %error, "Analysis failed, saving record with default feedback");
        self.stage(PipelineStage::Degrading);
        if let Some(ref cb) = self.config.progress {
            cb.on_degraded(&error.to_string());
        }
    }
}
