//! First-page rasterisation: render the uploaded PDF to a preview PNG.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so the Tokio worker threads never stall during CPU-heavy
//! rendering.
//!
//! ## Why a two-tier scale fallback?
//!
//! Page 1 is rendered at a high quality scale first (default 4× the page's
//! point size) because vision models need crisp text. Very large source
//! pages can exhaust rendering memory at that scale, so a failed attempt is
//! retried at the lower tier (default 2×) before giving up — trading
//! fidelity for reliability rather than failing outright.
//!
//! ## Engine initialisation
//!
//! Locating and validating the pdfium dynamic library happens exactly once
//! per process, behind a [`tokio::sync::OnceCell`]. Concurrent first callers
//! all await the same in-flight discovery instead of racing their own. The
//! `Pdfium` handle itself is `!Send`, so each render binds a fresh instance
//! from the memoised source; the OS caches `dlopen`, making repeat binds
//! near-free.

use crate::error::MediScanError;
use crate::pipeline::encode;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// The rasteriser's output: one PNG preview of page 1.
#[derive(Debug, Clone)]
pub struct RasterizedPreview {
    /// PNG-encoded raster of page 1.
    pub png: Vec<u8>,
    /// Derived file name for the preview blob (`<original stem>.png`).
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    /// The scale the successful render used (equals the fallback scale when
    /// the primary attempt failed).
    pub scale_used: f32,
}

impl RasterizedPreview {
    /// In-memory handle for immediate display or multimodal API input.
    pub fn data_uri(&self) -> String {
        encode::png_data_uri(&self.png)
    }
}

/// Renders page 1 of an uploaded document to a preview PNG.
///
/// The trait exists so orchestrator tests can run without the pdfium
/// binary; production code uses [`PdfiumRasterizer`].
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render page 1 at `primary_scale`, retrying once at `fallback_scale`.
    async fn rasterize_first_page(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        primary_scale: f32,
        fallback_scale: f32,
    ) -> Result<RasterizedPreview, MediScanError>;
}

/// Derive the preview blob name from the uploaded document name.
pub fn preview_file_name(original: &str) -> String {
    let stem = original
        .strip_suffix(".pdf")
        .or_else(|| original.strip_suffix(".PDF"))
        .unwrap_or(original);
    format!("{stem}.png")
}

// ── Pdfium-backed rasteriser ─────────────────────────────────────────────

/// How the pdfium library is located. Resolved once, bound per render.
#[derive(Debug, Clone)]
pub struct RasterEngine {
    source: BindingSource,
}

#[derive(Debug, Clone)]
enum BindingSource {
    /// Explicit library file path.
    Library(String),
    /// Platform system library search.
    System,
}

impl RasterEngine {
    /// Bind a `Pdfium` instance from the memoised source.
    ///
    /// Must be called on a blocking thread; the returned handle is `!Send`.
    fn bind(&self) -> Result<Pdfium, MediScanError> {
        let bindings = match &self.source {
            BindingSource::Library(path) => Pdfium::bind_to_library(path),
            BindingSource::System => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| MediScanError::PdfiumBindingFailed(format!("{e}")))?;
        Ok(Pdfium::new(bindings))
    }
}

static ENGINE: OnceCell<RasterEngine> = OnceCell::const_new();

/// The process-wide rendering engine, initialised on first use.
///
/// Concurrent callers during the first call are coalesced onto one
/// discovery; later calls return the memoised engine immediately.
pub async fn engine() -> Result<&'static RasterEngine, MediScanError> {
    ENGINE
        .get_or_try_init(|| async {
            tokio::task::spawn_blocking(discover_engine)
                .await
                .map_err(|e| MediScanError::Internal(format!("Engine discovery panicked: {e}")))?
        })
        .await
}

/// Locate a loadable pdfium library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
///
/// Each candidate is validated by actually binding it, so the memoised
/// engine is known-good.
fn discover_engine() -> Result<RasterEngine, MediScanError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        return match Pdfium::bind_to_library(&path) {
            Ok(_) => Ok(RasterEngine {
                source: BindingSource::Library(path),
            }),
            Err(e) => Err(MediScanError::PdfiumBindingFailed(format!(
                "PDFIUM_DYNAMIC_LIB_PATH='{path}': {e}"
            ))),
        };
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if Pdfium::bind_to_library(&lib_path).is_ok() {
                debug!(path = %lib_path.display(), "Loaded pdfium from executable directory");
                return Ok(RasterEngine {
                    source: BindingSource::Library(lib_path.to_string_lossy().into_owned()),
                });
            }
        }
    }

    Pdfium::bind_to_system_library()
        .map_err(|e| MediScanError::PdfiumBindingFailed(format!("{e}")))?;
    Ok(RasterEngine {
        source: BindingSource::System,
    })
}

/// Production rasteriser over the process-wide pdfium engine.
#[derive(Debug, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize_first_page(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        primary_scale: f32,
        fallback_scale: f32,
    ) -> Result<RasterizedPreview, MediScanError> {
        let mut magic = [0u8; 4];
        if bytes.len() >= 4 {
            magic.copy_from_slice(&bytes[..4]);
        }
        if &magic != b"%PDF" {
            return Err(MediScanError::NotAPdf {
                name: original_name.to_string(),
                magic,
            });
        }

        let engine = engine().await?;
        let name = preview_file_name(original_name);

        tokio::task::spawn_blocking(move || {
            render_blocking(engine, &bytes, name, primary_scale, fallback_scale)
        })
        .await
        .map_err(|e| MediScanError::Internal(format!("Render task panicked: {e}")))?
    }
}

/// Blocking implementation: load, render page 1, encode, with tier fallback.
fn render_blocking(
    engine: &RasterEngine,
    bytes: &[u8],
    file_name: String,
    primary_scale: f32,
    fallback_scale: f32,
) -> Result<RasterizedPreview, MediScanError> {
    let pdfium = engine.bind()?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        MediScanError::ConversionFailed {
            tried_scales: vec![],
            detail: format!("Failed to load PDF: {e}"),
        }
    })?;

    let pages = document.pages();
    let page = pages
        .first()
        .map_err(|e| MediScanError::ConversionFailed {
            tried_scales: vec![],
            detail: format!("Document has no renderable first page: {e}"),
        })?;
    info!("PDF loaded: {} pages, rendering page 1", pages.len());

    match render_page_at_scale(&page, primary_scale, &file_name) {
        Ok(preview) => Ok(preview),
        Err(primary_err) => {
            warn!(
                scale = primary_scale,
                error = %primary_err,
                "High quality conversion failed, retrying with lower quality"
            );
            render_page_at_scale(&page, fallback_scale, &file_name).map_err(|fallback_err| {
                MediScanError::ConversionFailed {
                    tried_scales: vec![primary_scale, fallback_scale],
                    detail: fallback_err,
                }
            })
        }
    }
}

/// One render attempt at a fixed scale. Errors are strings so the caller can
/// fold them into the tiered [`MediScanError::ConversionFailed`].
fn render_page_at_scale(
    page: &PdfPage<'_>,
    scale: f32,
    file_name: &str,
) -> Result<RasterizedPreview, String> {
    let target_w = (page.width().value * scale).max(1.0) as i32;
    let target_h = (page.height().value * scale).max(1.0) as i32;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_w)
        .set_maximum_height(target_h);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("Rendering failed at scale {scale}: {e:?}"))?;

    let image: DynamicImage = bitmap.as_image();
    let (width, height) = (image.width(), image.height());

    let png = encode::encode_png(&image)
        .map_err(|e| format!("PNG encoding failed at scale {scale}: {e}"))?;

    debug!(scale, width, height, png_size = png.len(), "Rendered page 1");

    Ok(RasterizedPreview {
        png,
        file_name: file_name.to_string(),
        width,
        height,
        scale_used: scale,
    })
}

// ── Mock for testing ─────────────────────────────────────────────────────

/// Mock rasteriser returning a minimal PNG, without requiring the pdfium
/// binary. `failing_primary` exercises the quality-fallback path;
/// `failing` exercises total conversion failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockRasterizer {
    fail_primary: bool,
    fail_both: bool,
}

impl MockRasterizer {
    /// Succeeds at the primary scale.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary attempt fails, fallback succeeds.
    pub fn failing_primary() -> Self {
        Self {
            fail_primary: true,
            fail_both: false,
        }
    }

    /// Both tiers fail.
    pub fn failing() -> Self {
        Self {
            fail_primary: true,
            fail_both: true,
        }
    }
}

#[async_trait]
impl Rasterizer for MockRasterizer {
    async fn rasterize_first_page(
        &self,
        _bytes: Vec<u8>,
        original_name: &str,
        primary_scale: f32,
        fallback_scale: f32,
    ) -> Result<RasterizedPreview, MediScanError> {
        if self.fail_both {
            return Err(MediScanError::ConversionFailed {
                tried_scales: vec![primary_scale, fallback_scale],
                detail: "mock rendering failure".into(),
            });
        }
        Ok(RasterizedPreview {
            png: minimal_png(),
            file_name: preview_file_name(original_name),
            width: 1,
            height: 1,
            scale_used: if self.fail_primary {
                fallback_scale
            } else {
                primary_scale
            },
        })
    }
}

/// Minimal valid 1×1 PNG for mock rendering.
fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
