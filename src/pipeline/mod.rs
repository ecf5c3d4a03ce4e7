//! Pipeline stages for prescription analysis.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. switch the analysis provider) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! rasterize ──▶ encode ──▶ client ──▶ extract ──▶ normalize
//! (pdfium)     (base64)   (timeout    (fenced      (schema
//!                          race)       JSON)        repair)
//! ```
//!
//! 1. [`rasterize`] — render page 1 of the uploaded PDF; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]    — PNG-encode and base64-wrap the raster for the
//!    multimodal request body
//! 3. [`provider`]  — the analysis-provider boundary: response decoding
//!    types, the OpenRouter client, and the test mock
//! 4. [`client`]    — race the provider call against the timeout budget;
//!    the only stage with network I/O
//! 5. [`extract`]   — pull the JSON payload text out of the polymorphic
//!    response shape, tolerating markdown fencing
//! 6. [`normalize`] — coerce the payload into the fixed six-category
//!    feedback, or substitute the zero default

pub mod client;
pub mod encode;
pub mod extract;
pub mod normalize;
pub mod provider;
pub mod rasterize;
