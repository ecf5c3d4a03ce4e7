//! # mediscan
//!
//! Prescription analysis pipeline: rasterize an uploaded prescription,
//! analyze it with a vision language model, normalize the feedback, and
//! persist one record per request.
//!
//! ## Why this crate?
//!
//! The interesting part of a prescription-analysis product is not its UI —
//! it is the ingestion pipeline that has to survive everything a document
//! and a model can throw at it: oversized pages that exhaust rendering
//! memory, providers that hang past any reasonable deadline, responses that
//! wrap JSON in markdown fences or split it across content parts, and
//! payloads that are not JSON at all. This crate implements that pipeline so
//! a failed analysis *degrades* the result instead of losing the upload.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Upload     original document → blob store
//!  ├─ 2. Rasterize  page 1 via pdfium, scale 4 → 2 fallback (spawn_blocking)
//!  ├─ 3. Upload     preview PNG → blob store
//!  ├─ 4. Analyze    vision model call raced against a 30 s timeout
//!  ├─ 5. Extract    JSON payload from the polymorphic response, fences stripped
//!  ├─ 6. Normalize  six-category feedback, or the zero default on any failure
//!  └─ 7. Persist    exactly one record under prescription:<id>
//! ```
//!
//! Steps 1–3 are fatal on failure (nothing persisted); steps 4–6 degrade to
//! `Feedback::default()` and the run still completes. See [`error`] for the
//! full taxonomy.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediscan::{AnalysisConfig, AnalysisRequest, Analyzer, MemoryStore, StaticAuth};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider resolved from OPENROUTER_API_KEY
//!     let store = Arc::new(MemoryStore::new());
//!     let analyzer = Analyzer::new(
//!         Arc::new(StaticAuth::signed_in("demo")),
//!         store.clone(),
//!         store,
//!         AnalysisConfig::default(),
//!     );
//!
//!     let outcome = analyzer
//!         .analyze(AnalysisRequest {
//!             file_name: "rx.pdf".into(),
//!             bytes: std::fs::read("rx.pdf")?,
//!             patient_name: Some("Alice Johnson".into()),
//!             doctor_name: Some("Dr. Smith".into()),
//!             symptoms: None,
//!         })
//!         .await?;
//!
//!     println!("record {}", outcome.record.id);
//!     if let Some(reason) = outcome.degraded {
//!         eprintln!("degraded: {reason}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mediscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mediscan = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisOutcome, AnalysisRequest, Analyzer};
pub use auth::{AuthProvider, StaticAuth, User};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, DEFAULT_MODEL};
pub use error::{AnalysisError, MediScanError};
pub use history::{
    export_snapshot, list_prescriptions, load_settings, save_settings, wipe, ExportSnapshot,
};
pub use pipeline::provider::{AnalysisProvider, MockProvider, OpenRouterProvider, ProviderResponse};
pub use pipeline::rasterize::{MockRasterizer, PdfiumRasterizer, Rasterizer, RasterizedPreview};
pub use progress::{AnalysisProgress, NoopProgress, PipelineStage, ProgressCallback};
pub use record::{CategoryFeedback, Feedback, PrescriptionRecord, RecordId, Settings, Tip, TipKind};
pub use store::{BlobStore, KvStore, LocalStore, MemoryStore, StoredFile};
