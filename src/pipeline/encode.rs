//! Image encoding: raster → PNG bytes → base64 data URI.
//!
//! Vision APIs accept images as base64 data URIs embedded in the JSON
//! request body. PNG is chosen over JPEG because it is lossless — text
//! crispness matters far more than file size when a model has to read a
//! prescription.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode a rendered page image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded image → {} PNG bytes", buf.len());
    Ok(buf)
}

/// Wrap PNG bytes in a `data:image/png;base64,…` URI.
///
/// The same handle serves both the in-memory preview and the multimodal
/// request body, so the two can never drift apart.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
