//! Image encoding: page image file → base64 `ImageData` for vision calls.
//!
//! Page images are already PNG files on disk (written by the page iterator
//! for the OCR engine), so encoding is just read + base64. Standalone image
//! uploads keep their own format; the MIME type comes from the magic bytes,
//! not the extension.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::io;
use std::path::Path;
use tracing::debug;

/// Encode an image file for the vision API, with `detail: "high"` so fine
/// print survives the provider's tiling.
pub async fn encode_image_file(path: &Path) -> io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    encode_image_bytes(&bytes)
}

pub fn encode_image_bytes(bytes: &[u8]) -> io::Result<ImageData> {
    let format = image::guess_format(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, format.to_mime_type()).with_detail("high"))
}
