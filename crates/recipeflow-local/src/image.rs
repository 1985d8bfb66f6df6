//! Image decoding, validation, and normalization to a canonical JPEG.
//!
//! Whatever arrives (raw bytes or base64, any supported container, any
//! color mode) leaves as an opaque RGB JPEG no larger than 2048px on its
//! long edge, so every downstream consumer sees one uniform contract.

use base64::Engine;
use image::imageops::FilterType;
use recipeflow_core::{Error, Result};
use std::io::Cursor;
use tracing::info;

/// Decoded payloads above this are rejected outright.
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Long-edge ceiling after normalization.
pub const MAX_DIMENSION: u32 = 2048;

const JPEG_QUALITY: u8 = 85;

/// One input image, as the caller provides it.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    /// Base64 payload, with or without a `data:image/...;base64,` prefix.
    Base64(String),
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// JPEG-encoded bytes.
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    /// Heuristic OCR-suitability score in [0.1, 1.0].
    pub quality_score: f64,
}

fn decode_input(input: &ImageInput) -> Result<Vec<u8>> {
    match input {
        ImageInput::Bytes(b) => Ok(b.clone()),
        ImageInput::Base64(s) => {
            let payload = match s.split_once(',') {
                // data URL: "data:image/png;base64,<payload>"
                Some((header, rest)) if header.starts_with("data:") => rest,
                _ => s.as_str(),
            };
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| Error::InvalidImage(format!("base64 decode failed: {e}")))
        }
    }
}

fn format_allowed(format: image::ImageFormat) -> bool {
    matches!(
        format,
        image::ImageFormat::Jpeg
            | image::ImageFormat::Png
            | image::ImageFormat::WebP
            | image::ImageFormat::Gif
    )
}

/// Flatten any alpha onto a white background; palette and gray modes come
/// out as plain RGB too.
fn flatten_to_rgb(img: &image::DynamicImage) -> image::RgbImage {
    let rgba = img.to_rgba8();
    let mut rgb = image::RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u16;
        let blend = |c: u8| -> u8 { ((c as u16 * a + 255 * (255 - a)) / 255) as u8 };
        rgb.put_pixel(x, y, image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    rgb
}

fn quality_score(width: u32, height: u32, original: (u32, u32)) -> f64 {
    let mut quality: f64 = 0.5;

    let pixel_count = width as u64 * height as u64;
    if pixel_count >= 1_000_000 {
        quality += 0.2;
    } else if pixel_count >= 500_000 {
        quality += 0.1;
    } else if pixel_count < 100_000 {
        quality -= 0.2;
    }

    // Recipe cards and cookbook pages are usually modestly rectangular.
    let aspect = width.max(height) as f64 / width.min(height).max(1) as f64;
    if (1.2..=2.0).contains(&aspect) {
        quality += 0.1;
    } else if aspect > 3.0 {
        quality -= 0.1;
    }

    let (ow, oh) = original;
    let original_pixels = ow as u64 * oh as u64;
    if (width, height) != original && original_pixels > 0 {
        let reduction = pixel_count as f64 / original_pixels as f64;
        if reduction < 0.5 {
            quality -= 0.1;
        }
    }

    quality.clamp(0.1, 1.0)
}

/// Decode, validate, downscale, and re-encode one image.
pub fn normalize_image(input: &ImageInput) -> Result<NormalizedImage> {
    let bytes = decode_input(input)?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(Error::InvalidImage(format!(
            "image too large: {} bytes (max {MAX_IMAGE_BYTES})",
            bytes.len()
        )));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| Error::InvalidImage(format!("unrecognized image data: {e}")))?;
    if !format_allowed(format) {
        return Err(Error::InvalidImage(format!(
            "unsupported image format: {format:?}"
        )));
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| Error::InvalidImage(format!("decode failed: {e}")))?;
    let original = (decoded.width(), decoded.height());

    let resized = if decoded.width().max(decoded.height()) > MAX_DIMENSION {
        let out = decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3);
        info!(
            from = ?original,
            to = ?(out.width(), out.height()),
            "downscaled image"
        );
        out
    } else {
        decoded
    };

    let rgb = flatten_to_rgb(&resized);
    let (width, height) = (rgb.width(), rgb.height());

    let mut data = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut data), JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::InvalidImage(format!("jpeg encode failed: {e}")))?;

    Ok(NormalizedImage {
        data,
        mime_type: "image/jpeg",
        width,
        height,
        quality_score: quality_score(width, height, original),
    })
}
