//! Block-DC quantization index modulation.
//!
//! Each payload bit owns one 8x8 block, chosen by a seed-keyed permutation of
//! all blocks. The bit is carried by the parity of the quantized block mean
//! luma (the block's DCT DC coefficient up to a constant). Shifting R, G and
//! B by the same delta shifts BT.601 luma by exactly that delta.

use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::payload::{PayloadBitmap, PayloadShape};
use super::WatermarkEngine;
use crate::error::{AegisError, Result};

const BLOCK: u32 = 8;

/// Bundled blind watermark engine.
///
/// Extraction cannot observe the embed intensity, so the engine decodes
/// against the intensity it was constructed with.
#[derive(Debug, Clone, Copy)]
pub struct DcQimEngine {
    decode_intensity: u8,
}

impl Default for DcQimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DcQimEngine {
    pub fn new() -> Self {
        Self::with_intensity(super::DEFAULT_INTENSITY)
    }

    pub fn with_intensity(decode_intensity: u8) -> Self {
        Self { decode_intensity }
    }

    fn step(intensity: u8) -> f64 {
        4.0 + 2.0 * f64::from(intensity)
    }

    fn block_order(seed: u32, width: u32, height: u32, needed: usize) -> Result<Vec<(u32, u32)>> {
        let cols = width / BLOCK;
        let rows = height / BLOCK;
        let available = (cols * rows) as usize;
        if needed > available {
            return Err(AegisError::EngineFailure(format!(
                "surface {width}x{height} has {available} blocks, payload needs {needed}"
            )));
        }

        let mut order: Vec<(u32, u32)> = (0..rows)
            .flat_map(|by| (0..cols).map(move |bx| (bx, by)))
            .collect();
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        order.shuffle(&mut rng);
        order.truncate(needed);
        Ok(order)
    }

    fn block_mean(surface: &RgbImage, bx: u32, by: u32) -> f64 {
        let mut sum = 0.0;
        for y in by * BLOCK..(by + 1) * BLOCK {
            for x in bx * BLOCK..(bx + 1) * BLOCK {
                let [r, g, b] = surface.get_pixel(x, y).0;
                sum += 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            }
        }
        sum / f64::from(BLOCK * BLOCK)
    }
}

impl WatermarkEngine for DcQimEngine {
    fn embed(
        &self,
        seed: u32,
        surface: &RgbImage,
        payload: &PayloadBitmap,
        intensity: u8,
    ) -> Result<RgbImage> {
        let step = Self::step(intensity);
        let order = Self::block_order(seed, surface.width(), surface.height(), payload.bits().len())?;
        let mut out = surface.clone();

        for (&bit, &(bx, by)) in payload.bits().iter().zip(order.iter()) {
            let mean = Self::block_mean(surface, bx, by);
            let offset = if bit { step / 2.0 } else { 0.0 };
            let target = ((mean - offset) / step).round() * step + offset;
            let delta = target - mean;

            for y in by * BLOCK..(by + 1) * BLOCK {
                for x in bx * BLOCK..(bx + 1) * BLOCK {
                    let px = out.get_pixel_mut(x, y);
                    for channel in px.0.iter_mut() {
                        *channel = (f64::from(*channel) + delta).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }

        Ok(out)
    }

    fn extract(&self, seed: u32, surface: &RgbImage, shape: PayloadShape) -> Result<PayloadBitmap> {
        let step = Self::step(self.decode_intensity);
        let order = Self::block_order(seed, surface.width(), surface.height(), shape.bit_count())?;

        let bits = order
            .iter()
            .map(|&(bx, by)| {
                let ratio = Self::block_mean(surface, bx, by) / step;
                let frac = ratio - ratio.floor();
                (0.25..0.75).contains(&frac)
            })
            .collect();

        PayloadBitmap::from_bits(shape, bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{derive_seed, render_payload, DEFAULT_INTENSITY};
    use image::Rgb;

    fn textured(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (40 + (x * 3 + y) % 160) as u8,
                (60 + (y * 5) % 140) as u8,
                (90 + (x ^ y) % 100) as u8,
            ])
        })
    }

    #[test]
    fn test_roundtrip_exact_without_degradation() {
        let surface = textured(320, 240);
        let shape = PayloadShape::for_surface(320, 240);
        let payload = render_payload("ID: A1B2C3D4", shape);
        let seed = derive_seed("secret");

        let engine = DcQimEngine::new();
        let marked = engine.embed(seed, &surface, &payload, DEFAULT_INTENSITY).unwrap();
        let recovered = engine.extract(seed, &marked, shape).unwrap();

        assert!(recovered.agreement(&payload) > 0.98);
    }

    #[test]
    fn test_wrong_key_does_not_recover_payload() {
        let surface = textured(320, 240);
        let shape = PayloadShape::for_surface(320, 240);
        let payload = render_payload("ID: A1B2C3D4", shape);

        let engine = DcQimEngine::new();
        let marked = engine
            .embed(derive_seed("secret"), &surface, &payload, DEFAULT_INTENSITY)
            .unwrap();
        let recovered = engine.extract(derive_seed("other"), &marked, shape).unwrap();

        assert_ne!(recovered, payload);
    }

    #[test]
    fn test_decode_intensity_must_match() {
        let surface = textured(320, 240);
        let shape = PayloadShape::for_surface(320, 240);
        let payload = render_payload("ID: FF00", shape);
        let seed = derive_seed("k");

        let marked = DcQimEngine::with_intensity(9)
            .embed(seed, &surface, &payload, 9)
            .unwrap();
        let matched = DcQimEngine::with_intensity(9)
            .extract(seed, &marked, shape)
            .unwrap();
        assert!(matched.agreement(&payload) > 0.98);
    }

    #[test]
    fn test_payload_too_large_fails() {
        let surface = textured(64, 64);
        let shape = PayloadShape {
            width: 32,
            height: 32,
        };
        let payload = PayloadBitmap::blank(shape);
        let err = DcQimEngine::new()
            .embed(1, &surface, &payload, DEFAULT_INTENSITY)
            .unwrap_err();
        assert!(matches!(err, AegisError::EngineFailure(_)));
    }
}
