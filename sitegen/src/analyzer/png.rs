//! Image normalization: any decodable upload becomes a base64 PNG payload.

use crate::error::{Error, Result};
use crate::types::ImageContent;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::ColorType;
use image::DynamicImage;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

pub const PNG_MIME: &str = "image/png";

/// Decode an uploaded image of any supported format and re-encode it as PNG.
pub fn normalize(bytes: &[u8]) -> Result<ImageContent> {
    if bytes.is_empty() {
        return Err(Error::Document("Error opening image file: empty upload".into()));
    }
    let dynamic = image::load_from_memory(bytes)
        .map_err(|e| Error::Document(format!("Error opening image file: {}", e)))?;
    to_png_content(&dynamic)
}

/// PNG-encode an already decoded image.
pub fn to_png_content(image: &DynamicImage) -> Result<ImageContent> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ColorType::Rgba8.into(),
        )
        .map_err(|e| Error::Document(format!("failed to encode PNG: {}", e)))?;

    Ok(ImageContent {
        data: BASE64_STANDARD.encode(&buffer),
        mime_type: PNG_MIME.to_string(),
    })
}
