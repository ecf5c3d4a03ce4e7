//! Cross-stage pipeline tests for mediscan.
//!
//! Everything here runs hermetically: the analysis provider is mocked, the
//! rasteriser is mocked (no pdfium binary needed), and both stores are
//! in-memory. The OpenRouter wire-format tests at the bottom stand up a
//! local wiremock server instead of calling the real API.
//!
//! Run with:
//!   cargo test --test pipeline

use mediscan::pipeline::provider::ContentPart;
use mediscan::store::StoreError;
use mediscan::{
    AnalysisConfig, AnalysisError, AnalysisProgress, AnalysisProvider, AnalysisRequest, Analyzer,
    BlobStore, KvStore, MediScanError, MemoryStore, MockProvider, MockRasterizer, OpenRouterProvider,
    PipelineStage, StaticAuth, StoredFile,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A provider payload with six well-formed categories and overall score 85.
fn full_payload() -> &'static str {
    r#"{
        "overallScore": 85,
        "medications": {"score": 90, "tips": [
            {"type": "good", "tip": "Appropriate antibiotic choice", "explanation": "First-line for this indication"}
        ]},
        "dosage": {"score": 80, "tips": [
            {"type": "improve", "tip": "Review dosage for age", "explanation": "Consider renal adjustment"}
        ]},
        "instructions": {"score": 88, "tips": []},
        "sideEffects": {"score": 75, "tips": []},
        "lifestyle": {"score": 92, "tips": []},
        "healthCompliance": {"score": 85, "tips": []}
    }"#
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        file_name: "rx.pdf".into(),
        bytes: b"%PDF-1.7 test".to_vec(),
        patient_name: Some("Alice Johnson".into()),
        doctor_name: Some("Dr. Smith".into()),
        symptoms: Some("persistent headache".into()),
    }
}

/// Build an analyzer over one `MemoryStore` with the given provider mock.
fn analyzer(store: &Arc<MemoryStore>, provider: MockProvider) -> Analyzer {
    let config = AnalysisConfig::builder()
        .provider(Arc::new(provider))
        .build()
        .expect("valid config");
    Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
}

/// Records every stage transition and degrade reason the pipeline fires.
#[derive(Default)]
struct TrackingProgress {
    stages: Mutex<Vec<PipelineStage>>,
    degrade_reasons: Mutex<Vec<String>>,
}

impl AnalysisProgress for TrackingProgress {
    fn on_stage(&self, stage: PipelineStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_degraded(&self, reason: &str) {
        self.degrade_reasons.lock().unwrap().push(reason.to_string());
    }
}

/// Blob store that starts failing after `succeed_first` successful uploads.
/// `succeed_first = 0` fails the original-document upload; `1` lets that
/// through and fails the preview upload.
struct FailingBlobStore {
    succeed_first: usize,
    uploads: AtomicUsize,
}

impl FailingBlobStore {
    fn new(succeed_first: usize) -> Self {
        Self {
            succeed_first,
            uploads: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(&self, name: &str, _bytes: &[u8]) -> Result<StoredFile, StoreError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if n < self.succeed_first {
            Ok(StoredFile {
                path: format!("/{name}"),
            })
        } else {
            Err(StoreError::Other("storage quota exceeded".into()))
        }
    }

    async fn read(&self, _path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    async fn delete(&self, _path: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_dir(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(vec![])
    }
}

/// Count persisted prescription records.
async fn record_count(store: &MemoryStore) -> usize {
    store.list("prescription:*", false).await.unwrap().len()
}

// ── End-to-end success ───────────────────────────────────────────────────────

/// A fenced JSON payload with six well-formed categories round-trips into a
/// persisted record whose feedback comes from the payload, not the default.
#[tokio::test]
async fn fenced_payload_persists_full_feedback() {
    let store = Arc::new(MemoryStore::new());
    let fenced = format!("```json\n{}\n```", full_payload());
    let outcome = analyzer(&store, MockProvider::returning_text(&fenced))
        .analyze(request())
        .await
        .expect("pipeline must succeed");

    assert!(outcome.degraded.is_none(), "full payload must not degrade");
    let fb = &outcome.record.feedback;
    assert_eq!(fb.overall_score, 85);
    assert_eq!(fb.medications.score, 90);
    assert_eq!(fb.dosage.score, 80);
    assert_eq!(fb.instructions.score, 88);
    assert_eq!(fb.side_effects.score, 75);
    assert_eq!(fb.lifestyle.score, 92);
    assert_eq!(fb.health_compliance.score, 85);
    assert_eq!(fb.medications.tips.len(), 1);
    assert!(!fb.is_all_zero());

    // Raw text kept verbatim, fences included.
    assert_eq!(outcome.record.ai_response, fenced);

    // Original document + preview image, one record.
    assert_eq!(store.file_count().await, 2);
    assert_eq!(record_count(&store).await, 1);

    // The record loads back by id.
    let loaded = analyzer(&store, MockProvider::returning_text(""))
        .load(&outcome.record.id)
        .await
        .unwrap()
        .expect("record must exist");
    assert_eq!(loaded.feedback.overall_score, 85);
    assert_eq!(loaded.patient_name.as_deref(), Some("Alice Johnson"));
}

/// An unfenced payload and a content-part-array payload yield the same
/// feedback as the plain-string case.
#[tokio::test]
async fn response_shapes_are_equivalent() {
    let as_string = {
        let store = Arc::new(MemoryStore::new());
        analyzer(&store, MockProvider::returning_text(full_payload()))
            .analyze(request())
            .await
            .unwrap()
    };

    let as_parts = {
        let store = Arc::new(MemoryStore::new());
        let response = mediscan::ProviderResponse::from_parts(vec![ContentPart::Object {
            text: full_payload().into(),
        }]);
        analyzer(&store, MockProvider::returning(response))
            .analyze(request())
            .await
            .unwrap()
    };

    assert!(as_string.degraded.is_none());
    assert!(as_parts.degraded.is_none());
    assert_eq!(as_string.record.feedback, as_parts.record.feedback);
}

/// The success path fires stages in order, with `Normalizing` (not
/// `Degrading`) between `Analyzing` and `Persisting`.
#[tokio::test]
async fn success_path_stage_sequence() {
    let store = Arc::new(MemoryStore::new());
    let progress = Arc::new(TrackingProgress::default());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .progress(progress.clone())
        .build()
        .unwrap();
    Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
    .analyze(request())
    .await
    .unwrap();

    let stages = progress.stages.lock().unwrap().clone();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Uploading,
            PipelineStage::Converting,
            PipelineStage::UploadingPreview,
            PipelineStage::Analyzing,
            PipelineStage::Normalizing,
            PipelineStage::Persisting,
            PipelineStage::Done,
        ]
    );
    assert!(progress.degrade_reasons.lock().unwrap().is_empty());
}

// ── Degrade scenarios ────────────────────────────────────────────────────────

/// A provider that never settles loses the 30-second race; the run degrades
/// and still reaches `Done` with a persisted default-feedback record.
/// Paused time lets the test cover the full budget instantly.
#[tokio::test(start_paused = true)]
async fn timeout_degrades_and_still_persists() {
    let store = Arc::new(MemoryStore::new());
    let progress = Arc::new(TrackingProgress::default());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::hanging()))
        .progress(progress.clone())
        .build()
        .unwrap();
    let outcome = Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
    .analyze(request())
    .await
    .expect("timeout must not fail the run");

    assert!(matches!(
        outcome.degraded,
        Some(AnalysisError::Timeout { secs: 30 })
    ));
    assert!(outcome.record.feedback.is_all_zero());
    assert!(outcome.record.ai_response.starts_with("Analysis failed:"));
    assert_eq!(record_count(&store).await, 1);

    let stages = progress.stages.lock().unwrap().clone();
    assert!(stages.contains(&PipelineStage::Degrading));
    assert!(!stages.contains(&PipelineStage::Normalizing));
    assert_eq!(*stages.last().unwrap(), PipelineStage::Done);
}

/// A provider-reported error degrades the same way a timeout does, but the
/// recorded failure text names the provider error.
#[tokio::test]
async fn provider_error_degrades() {
    let store = Arc::new(MemoryStore::new());
    let outcome = analyzer(
        &store,
        MockProvider::failing(AnalysisError::Provider {
            detail: "HTTP 503: upstream overloaded".into(),
        }),
    )
    .analyze(request())
    .await
    .unwrap();

    assert!(matches!(outcome.degraded, Some(AnalysisError::Provider { .. })));
    assert!(outcome.record.feedback.is_all_zero());
    assert!(outcome.record.ai_response.contains("HTTP 503"));
    assert_eq!(record_count(&store).await, 1);
}

/// Plain prose with no JSON at all: the parse failure is recovered, the
/// record gets default zero-score feedback, and the raw response is the
/// original text, verbatim.
#[tokio::test]
async fn malformed_payload_keeps_raw_response() {
    let store = Arc::new(MemoryStore::new());
    let prose = "The prescription looks fine to me. No JSON here.";
    let outcome = analyzer(&store, MockProvider::returning_text(prose))
        .analyze(request())
        .await
        .unwrap();

    assert!(matches!(outcome.degraded, Some(AnalysisError::Parse { .. })));
    assert!(outcome.record.feedback.is_all_zero());
    assert_eq!(outcome.record.ai_response, prose);
    assert_eq!(record_count(&store).await, 1);
}

/// A response with no recognisable text shape is an extraction failure,
/// distinct from a parse failure, and degrades the same way.
#[tokio::test]
async fn empty_response_is_extraction_failure() {
    let store = Arc::new(MemoryStore::new());
    let outcome = analyzer(
        &store,
        MockProvider::returning(mediscan::ProviderResponse::default()),
    )
    .analyze(request())
    .await
    .unwrap();

    assert!(matches!(
        outcome.degraded,
        Some(AnalysisError::Extraction { .. })
    ));
    assert_eq!(record_count(&store).await, 1);
}

// ── Rasterisation scenarios ──────────────────────────────────────────────────

/// Primary-scale failure falls back to the lower tier; no fatal error, the
/// pipeline proceeds normally and nothing degrades.
#[tokio::test]
async fn raster_fallback_proceeds_normally() {
    let store = Arc::new(MemoryStore::new());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .build()
        .unwrap();
    let outcome = Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::failing_primary()))
    .analyze(request())
    .await
    .expect("fallback tier must rescue the run");

    assert!(outcome.degraded.is_none());
    assert_eq!(outcome.record.feedback.overall_score, 85);
    assert_eq!(store.file_count().await, 2, "preview image must still be produced");
}

/// Both tiers failing is fatal: the run reports conversion failure with the
/// tried scales and no record is persisted.
#[tokio::test]
async fn total_conversion_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .build()
        .unwrap();
    let err = Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::failing()))
    .analyze(request())
    .await
    .unwrap_err();

    match err {
        MediScanError::ConversionFailed { tried_scales, .. } => {
            assert_eq!(tried_scales, vec![4.0, 2.0]);
        }
        other => panic!("expected ConversionFailed, got {other:?}"),
    }
    assert_eq!(record_count(&store).await, 0, "fatal runs persist nothing");
}

// ── Fatal upload scenarios ───────────────────────────────────────────────────

/// Failure to store the original document aborts the run before anything
/// else happens; the error names the upload step.
#[tokio::test]
async fn document_upload_failure_is_fatal() {
    let kv = Arc::new(MemoryStore::new());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .build()
        .unwrap();
    let err = Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        Arc::new(FailingBlobStore::new(0)),
        kv.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
    .analyze(request())
    .await
    .unwrap_err();

    assert!(matches!(err, MediScanError::UploadFailed { ref name, .. } if name == "rx.pdf"));
    assert_eq!(record_count(&kv).await, 0);
}

/// Failure to store the preview image is reported as its own error, distinct
/// from the document-upload failure.
#[tokio::test]
async fn preview_upload_failure_is_fatal_and_distinct() {
    let kv = Arc::new(MemoryStore::new());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .build()
        .unwrap();
    let err = Analyzer::new(
        Arc::new(StaticAuth::signed_in("alice")),
        Arc::new(FailingBlobStore::new(1)),
        kv.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
    .analyze(request())
    .await
    .unwrap_err();

    assert!(matches!(err, MediScanError::PreviewUploadFailed { ref name, .. } if name == "rx.png"));
    assert_eq!(record_count(&kv).await, 0);
}

/// The pipeline gates on authentication before touching any collaborator.
#[tokio::test]
async fn unauthenticated_runs_nothing() {
    let store = Arc::new(MemoryStore::new());
    let config = AnalysisConfig::builder()
        .provider(Arc::new(MockProvider::returning_text(full_payload())))
        .build()
        .unwrap();
    let err = Analyzer::new(
        Arc::new(StaticAuth::signed_out()),
        store.clone(),
        store.clone(),
        config,
    )
    .with_rasterizer(Arc::new(MockRasterizer::new()))
    .analyze(request())
    .await
    .unwrap_err();

    assert!(matches!(err, MediScanError::NotAuthenticated));
    assert_eq!(store.file_count().await, 0, "nothing may be uploaded");
    assert_eq!(record_count(&store).await, 0);
}

// ── Persistence invariants ───────────────────────────────────────────────────

/// One user action, one record — and a second action, a second record, never
/// an overwrite of the first.
#[tokio::test]
async fn exactly_one_record_per_run() {
    let store = Arc::new(MemoryStore::new());

    let first = analyzer(&store, MockProvider::returning_text(full_payload()))
        .analyze(request())
        .await
        .unwrap();
    assert_eq!(record_count(&store).await, 1);

    let second = analyzer(&store, MockProvider::returning_text(full_payload()))
        .analyze(request())
        .await
        .unwrap();
    assert_eq!(record_count(&store).await, 2);
    assert_ne!(first.record.id, second.record.id);
}

/// Degraded and full records land under the same key convention and list
/// together in the history.
#[tokio::test]
async fn history_lists_full_and_degraded_records() {
    let store = Arc::new(MemoryStore::new());
    analyzer(&store, MockProvider::returning_text(full_payload()))
        .analyze(request())
        .await
        .unwrap();
    analyzer(&store, MockProvider::returning_text("no json here"))
        .analyze(request())
        .await
        .unwrap();

    let records = mediscan::list_prescriptions(store.as_ref()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.feedback.overall_score == 85));
    assert!(records.iter().any(|r| r.feedback.is_all_zero()));
}

// ── OpenRouter wire format ───────────────────────────────────────────────────

/// The provider sends a bearer-authenticated multimodal chat completion and
/// decodes the assistant message back out of the first choice.
#[tokio::test]
async fn openrouter_wire_format_round_trip() {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "google/gemini-2.5-flash-image-preview",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "analyze this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"overallScore\": 85}"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenRouterProvider::new("test-key", "google/gemini-2.5-flash-image-preview")
        .with_base_url(server.uri());
    let response = provider
        .analyze("data:image/png;base64,AAAA", "analyze this")
        .await
        .expect("request must succeed");

    let text = mediscan::pipeline::extract::feedback_text(&response).unwrap();
    assert_eq!(text, "{\"overallScore\": 85}");
}

/// HTTP errors come back as provider errors carrying the status code, so the
/// orchestrator degrades instead of failing.
#[tokio::test]
async fn openrouter_http_error_is_provider_error() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let provider = OpenRouterProvider::new("test-key", "some/model").with_base_url(server.uri());
    let err = provider.analyze("data:", "prompt").await.unwrap_err();

    match err {
        AnalysisError::Provider { detail } => {
            assert!(detail.contains("500"), "got: {detail}");
            assert!(detail.contains("upstream exploded"), "got: {detail}");
        }
        other => panic!("expected Provider error, got {other:?}"),
    }
}

/// A response with an empty choices array is a provider error, not a panic.
#[tokio::test]
async fn openrouter_empty_choices_is_provider_error() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let provider = OpenRouterProvider::new("test-key", "some/model").with_base_url(server.uri());
    let err = provider.analyze("data:", "prompt").await.unwrap_err();
    assert!(matches!(err, AnalysisError::Provider { ref detail } if detail.contains("no choices")));
}
