//! Surface normalization shared by every carrier.
//!
//! Embed and extract must feed the engine surfaces of identical dimensions,
//! so both paths go through [`normalize_width`] with the same target and
//! filter before the payload shape is computed.

use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};

use crate::engine::{render_payload, PayloadBitmap, PayloadShape, WatermarkEngine};
use crate::error::Result;

/// Resampling filter for width normalization.
pub const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// JPEG quality used when a carrier asset must stay JPEG.
pub const JPEG_QUALITY: u8 = 95;

/// Scale `surface` to `target_width`, preserving aspect ratio.
///
/// Surfaces already at the target width are returned unchanged.
pub fn normalize_width(surface: &RgbImage, target_width: u32) -> RgbImage {
    let (width, height) = surface.dimensions();
    if width == target_width || width == 0 || target_width == 0 {
        return surface.clone();
    }
    let scaled_height = ((f64::from(height) * f64::from(target_width)) / f64::from(width))
        .round()
        .max(1.0) as u32;
    image::imageops::resize(surface, target_width, scaled_height, RESAMPLE_FILTER)
}

/// 3x3 per-channel median filter (salt-and-pepper suppression).
pub fn median3(surface: &RgbImage) -> RgbImage {
    let (width, height) = surface.dimensions();
    if width < 3 || height < 3 {
        return surface.clone();
    }

    RgbImage::from_fn(width, height, |x, y| {
        let mut out = [0u8; 3];
        for (c, slot) in out.iter_mut().enumerate() {
            let mut window = [0u8; 9];
            let mut n = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                    window[n] = surface.get_pixel(sx, sy).0[c];
                    n += 1;
                }
            }
            window.sort_unstable();
            *slot = window[4];
        }
        Rgb(out)
    })
}

/// Normalize, render the payload for the normalized shape, and embed.
pub fn embed_surface(
    engine: &dyn WatermarkEngine,
    seed: u32,
    surface: &RgbImage,
    payload_text: &str,
    target_width: u32,
    intensity: u8,
) -> Result<RgbImage> {
    let normalized = normalize_width(surface, target_width);
    let shape = PayloadShape::for_surface(normalized.width(), normalized.height());
    tracing::debug!(
        width = normalized.width(),
        height = normalized.height(),
        payload_side = shape.width,
        "Embedding surface"
    );
    let payload = render_payload(payload_text, shape);
    engine.embed(seed, &normalized, &payload, intensity)
}

/// Normalize, denoise, and recover the payload bitmap.
pub fn extract_surface(
    engine: &dyn WatermarkEngine,
    seed: u32,
    surface: &RgbImage,
    target_width: u32,
) -> Result<PayloadBitmap> {
    let normalized = normalize_width(surface, target_width);
    let shape = PayloadShape::for_surface(normalized.width(), normalized.height());
    tracing::debug!(
        width = normalized.width(),
        height = normalized.height(),
        payload_side = shape.width,
        "Extracting surface"
    );
    let denoised = median3(&normalized);
    engine.extract(seed, &denoised, shape)
}

/// Decode an image file as RGB, guessing the format from content.
///
/// Trailing bytes after the image stream (e.g. a signature trailer) are
/// ignored by the decoders.
pub fn load_surface(path: &Path) -> Result<RgbImage> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img.to_rgb8())
}

pub fn load_surface_from_memory(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Write a surface, picking the encoder from `format_hint` (or `path`).
pub fn save_surface(surface: &RgbImage, path: &Path, format_hint: Option<&Path>) -> Result<()> {
    let format = ImageFormat::from_path(format_hint.unwrap_or(path)).unwrap_or(ImageFormat::Png);
    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
            DynamicImage::ImageRgb8(surface.clone()).write_with_encoder(encoder)?;
        }
        other => surface.save_with_format(path, other)?,
    }
    Ok(())
}
