//! Payload bitmaps.
//!
//! A payload is short identifying text drawn into a square binary bitmap.
//! The bitmap's shape depends only on the surface's pixel dimensions, so the
//! extract path can recompute it from the (identically normalized) surface.

use std::path::Path;

use image::{GrayImage, Luma};

use super::font::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::error::{AegisError, Result};

/// Smallest payload side in bits.
pub const MIN_PAYLOAD_SIDE: u32 = 16;

/// Payload bitmap dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadShape {
    pub width: u32,
    pub height: u32,
}

impl PayloadShape {
    /// Shape for a surface of the given pixel dimensions.
    ///
    /// One bit per 8x8 block of the smaller axis, with a two block margin,
    /// rounded down to an even side and floored at [`MIN_PAYLOAD_SIDE`].
    pub fn for_surface(width: u32, height: u32) -> Self {
        let side = (height / 8).min(width / 8).saturating_sub(2);
        let side = ((side / 2) * 2).max(MIN_PAYLOAD_SIDE);
        Self {
            width: side,
            height: side,
        }
    }

    pub fn bit_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Binary payload bitmap, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBitmap {
    shape: PayloadShape,
    bits: Vec<bool>,
}

impl PayloadBitmap {
    /// All-clear bitmap.
    pub fn blank(shape: PayloadShape) -> Self {
        Self {
            shape,
            bits: vec![false; shape.bit_count()],
        }
    }

    /// Build from raw bits; the length must match the shape.
    pub fn from_bits(shape: PayloadShape, bits: Vec<bool>) -> Result<Self> {
        if bits.len() != shape.bit_count() {
            return Err(AegisError::EngineFailure(format!(
                "payload has {} bits, shape {}x{} needs {}",
                bits.len(),
                shape.width,
                shape.height,
                shape.bit_count()
            )));
        }
        Ok(Self { shape, bits })
    }

    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.shape.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = (y * self.shape.width + x) as usize;
        self.bits[idx] = value;
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Fraction of agreeing bits, or 0.0 if the shapes differ.
    pub fn agreement(&self, other: &Self) -> f64 {
        if self.shape != other.shape || self.bits.is_empty() {
            return 0.0;
        }
        let same = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .filter(|(a, b)| a == b)
            .count();
        same as f64 / self.bits.len() as f64
    }

    /// Render as a grayscale image, set bits white.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.shape.width, self.shape.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    pub fn from_image(img: &GrayImage) -> Self {
        let shape = PayloadShape {
            width: img.width(),
            height: img.height(),
        };
        let bits = img.pixels().map(|p| p.0[0] >= 128).collect();
        Self { shape, bits }
    }

    /// Save as PNG evidence.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_image()
            .save_with_format(path.as_ref(), image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Draw `text` centered into a bitmap of the given shape.
///
/// Words are wrapped onto as many lines as give the largest glyph scale, so
/// `ID: A1B2C3D4` becomes `ID:` over `A1B2C3D4` once that reads larger.
/// Strokes are thickened by a third of the scale, which always leaves part
/// of the one-column glyph spacing blank. A word wider than the bitmap at
/// scale 1 is clipped.
pub fn render_payload(text: &str, shape: PayloadShape) -> PayloadBitmap {
    let mut bitmap = PayloadBitmap::blank(shape);
    let layout = Layout::fit(text, shape);
    let scale = layout.scale;
    let thicken = (scale / 3) as i64;

    for (line, (origin_x, origin_y)) in layout.lines.iter().zip(layout.origins(shape)) {
        for (i, c) in line.iter().enumerate() {
            let rows = glyph(*c);
            let cell_x = origin_x + (i as u32 * GLYPH_ADVANCE * scale) as i64;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let px = cell_x + (col * scale) as i64;
                    let py = origin_y + (row as u32 * scale) as i64;
                    fill_block(
                        &mut bitmap,
                        px - thicken,
                        py - thicken,
                        scale + 2 * thicken as u32,
                    );
                }
            }
        }
    }

    bitmap
}

/// Text lines and the glyph scale they are drawn at.
#[derive(Debug)]
struct Layout {
    lines: Vec<Vec<char>>,
    scale: u32,
}

impl Layout {
    fn fit(text: &str, shape: PayloadShape) -> Self {
        let usable_w = shape.width * 9 / 10;
        let usable_h = shape.height * 9 / 10;
        let scale_for = |lines: &[Vec<char>]| {
            let widest = lines.iter().map(|l| line_width(l)).max().unwrap_or(0).max(1);
            (usable_w / widest).min(usable_h / text_height(lines.len()))
        };

        let single = vec![text.chars().collect::<Vec<char>>()];
        let mut best = Self {
            scale: scale_for(&single),
            lines: single,
        };

        let words: Vec<Vec<char>> = text.split_whitespace().map(|w| w.chars().collect()).collect();
        let longest = words.iter().map(Vec::len).max().unwrap_or(0);
        let total = text.chars().count();
        for max_chars in (longest.max(1)..total).rev() {
            let lines = wrap(&words, max_chars);
            if lines.is_empty() {
                continue;
            }
            let scale = scale_for(&lines);
            if scale > best.scale {
                best = Self { lines, scale };
            }
        }

        best.scale = best.scale.max(1);
        best
    }

    /// Top-left corner of each line, every line centered horizontally.
    fn origins(&self, shape: PayloadShape) -> Vec<(i64, i64)> {
        let block_h = text_height(self.lines.len()) * self.scale;
        let top = (shape.height as i64 - block_h as i64) / 2;
        self.lines
            .iter()
            .enumerate()
            .map(|(n, line)| {
                let w = line_width(line) * self.scale;
                let x = (shape.width as i64 - w as i64) / 2;
                let y = top + (n as u32 * LINE_ADVANCE * self.scale) as i64;
                (x, y)
            })
            .collect()
    }
}

/// Vertical advance between lines, in font pixels.
const LINE_ADVANCE: u32 = GLYPH_HEIGHT + 2;

fn line_width(line: &[char]) -> u32 {
    (line.len() as u32 * GLYPH_ADVANCE).saturating_sub(1)
}

fn text_height(lines: usize) -> u32 {
    (lines.max(1) as u32 * LINE_ADVANCE).saturating_sub(LINE_ADVANCE - GLYPH_HEIGHT)
}

/// Greedy word wrap; a word longer than `max_chars` keeps a line to itself.
fn wrap(words: &[Vec<char>], max_chars: usize) -> Vec<Vec<char>> {
    let mut lines: Vec<Vec<char>> = Vec::new();
    for word in words {
        match lines.last_mut() {
            Some(line) if line.len() + 1 + word.len() <= max_chars => {
                line.push(' ');
                line.extend_from_slice(word);
            }
            _ => lines.push(word.clone()),
        }
    }
    lines
}

fn fill_block(bitmap: &mut PayloadBitmap, x0: i64, y0: i64, size: u32) {
    let shape = bitmap.shape();
    for y in y0..y0 + size as i64 {
        for x in x0..x0 + size as i64 {
            if x >= 0 && y >= 0 && (x as u32) < shape.width && (y as u32) < shape.height {
                bitmap.set(x as u32, y as u32, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_is_pure_function_of_dimensions() {
        let a = PayloadShape::for_surface(1920, 1080);
        let b = PayloadShape::for_surface(1920, 1080);
        assert_eq!(a, b);
        // min(135, 240) - 2 = 133 -> 132
        assert_eq!(a.width, 132);
        assert_eq!(a.height, 132);
    }

    #[test]
    fn test_shape_floor() {
        assert_eq!(PayloadShape::for_surface(40, 40).width, MIN_PAYLOAD_SIDE);
        assert_eq!(PayloadShape::for_surface(0, 0).width, MIN_PAYLOAD_SIDE);
    }

    #[test]
    fn test_render_marks_pixels_inside_bounds() {
        let shape = PayloadShape::for_surface(1920, 1080);
        let bitmap = render_payload("ID: A1B2C3D4", shape);
        assert_eq!(bitmap.shape(), shape);
        assert!(bitmap.count_ones() > 0);
        assert!(bitmap.count_ones() < shape.bit_count());
    }

    /// Every column between two glyphs of a line has a blank stripe.
    fn assert_glyphs_separated(text: &str, shape: PayloadShape) {
        let bitmap = render_payload(text, shape);
        let layout = Layout::fit(text, shape);
        let scale = layout.scale;
        for (line, (x0, y0)) in layout.lines.iter().zip(layout.origins(shape)) {
            for i in 1..line.len() {
                let gap_x = x0 + ((i as u32 * GLYPH_ADVANCE - 1) * scale + scale / 2) as i64;
                if gap_x < 0 || gap_x >= shape.width as i64 {
                    continue;
                }
                for y in y0..y0 + (GLYPH_HEIGHT * scale) as i64 {
                    if y < 0 || y >= shape.height as i64 {
                        continue;
                    }
                    assert!(
                        !bitmap.get(gap_x as u32, y as u32),
                        "{text:?} at {}x{}: glyphs {} and {} touch at ({gap_x}, {y})",
                        shape.width,
                        shape.height,
                        i - 1,
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn test_glyphs_keep_a_blank_column() {
        for (w, h) in [(1920, 1080), (1920, 1440), (1920, 2716), (256, 256), (16, 16)] {
            assert_glyphs_separated("ID: A1B2C3D4", PayloadShape::for_surface(w, h));
        }
        assert_glyphs_separated("ID: 00FF00FF", PayloadShape { width: 16, height: 16 });
    }

    #[test]
    fn test_tracking_id_wraps_to_readable_scale() {
        let shape = PayloadShape::for_surface(1920, 1080);
        let layout = Layout::fit("ID: A1B2C3D4", shape);
        assert!(layout.scale >= 2, "scale {}", layout.scale);
        let lines: Vec<String> = layout.lines.iter().map(|l| l.iter().collect()).collect();
        assert_eq!(lines, vec!["ID:", "A1B2C3D4"]);
    }

    #[test]
    fn test_wrap_keeps_words_whole() {
        let words: Vec<Vec<char>> = ["ab", "cd", "efghij"].iter().map(|w| w.chars().collect()).collect();
        let lines: Vec<String> = wrap(&words, 5).iter().map(|l| l.iter().collect()).collect();
        assert_eq!(lines, vec!["ab cd", "efghij"]);
    }

    #[test]
    fn test_render_empty_text_is_blank() {
        let shape = PayloadShape::for_surface(256, 256);
        assert_eq!(render_payload("", shape).count_ones(), 0);
    }

    #[test]
    fn test_render_long_text_clips_without_panic() {
        let shape = PayloadShape::for_surface(64, 64);
        let bitmap = render_payload(&"W".repeat(200), shape);
        assert!(bitmap.count_ones() > 0);
    }

    #[test]
    fn test_image_conversion_preserves_bits() {
        let shape = PayloadShape::for_surface(400, 300);
        let bitmap = render_payload("ABC", shape);
        let restored = PayloadBitmap::from_image(&bitmap.to_image());
        assert_eq!(restored, bitmap);
        assert_eq!(restored.agreement(&bitmap), 1.0);
    }

    #[test]
    fn test_from_bits_rejects_wrong_length() {
        let shape = PayloadShape::for_surface(256, 256);
        assert!(PayloadBitmap::from_bits(shape, vec![true; 3]).is_err());
    }
}
