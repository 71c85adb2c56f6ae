//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aegis_core::carrier::{CarrierContext, CarrierSettings, PageRasterizer};
use aegis_core::engine::{PayloadBitmap, PayloadShape, WatermarkEngine};
use aegis_core::{AegisError, IdentityStore, Result};
use image::{Rgb, RgbImage};
use lopdf::{Document, Object};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const TARGET_WIDTH: u32 = 1920;

/// Deterministic stand-in for the real transform.
///
/// Embedding stamps a 4x4 block in the top-left corner with a colour derived
/// from the seed; extraction succeeds only when that colour is found. Both
/// directions reject surfaces that were not normalized to the target width.
#[derive(Default)]
pub struct FakeEngine {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl FakeEngine {
    /// Fail the `n`th embed call (1-based).
    pub fn failing_on_call(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(n),
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn stamp(seed: u32) -> Rgb<u8> {
        Rgb([seed as u8, (seed >> 8) as u8, (seed >> 16) as u8 | 1])
    }
}

impl WatermarkEngine for FakeEngine {
    fn embed(
        &self,
        seed: u32,
        surface: &RgbImage,
        _payload: &PayloadBitmap,
        _intensity: u8,
    ) -> Result<RgbImage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(AegisError::EngineFailure(format!("scripted failure on call {call}")));
        }
        if surface.width() != TARGET_WIDTH {
            return Err(AegisError::EngineFailure("surface not normalized".into()));
        }

        let mut out = surface.clone();
        for y in 0..4 {
            for x in 0..4 {
                out.put_pixel(x, y, Self::stamp(seed));
            }
        }
        Ok(out)
    }

    fn extract(&self, seed: u32, surface: &RgbImage, shape: PayloadShape) -> Result<PayloadBitmap> {
        if surface.width() != TARGET_WIDTH {
            return Err(AegisError::EngineFailure("surface not normalized".into()));
        }
        if surface.get_pixel(1, 1) != &Self::stamp(seed) {
            return Err(AegisError::EngineFailure("no signal".into()));
        }
        let mut bitmap = PayloadBitmap::blank(shape);
        bitmap.set(shape.width / 2, shape.height / 2, true);
        Ok(bitmap)
    }
}

/// Fixed page count; each render sleeps longer for earlier pages so tasks
/// finish in reverse order. Page `i` is `TARGET_WIDTH x (1000 + 100 * i)`.
pub struct ScriptedRasterizer {
    pub pages: usize,
    pub step: Duration,
}

impl ScriptedRasterizer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            step: Duration::from_millis(40),
        }
    }

    pub fn page_height(index: usize) -> u32 {
        1000 + 100 * index as u32
    }
}

impl PageRasterizer for ScriptedRasterizer {
    fn page_count(&self, _path: &Path) -> Result<usize> {
        Ok(self.pages)
    }

    fn render_page(&self, _path: &Path, index: usize, _zoom: f32) -> Result<RgbImage> {
        std::thread::sleep(self.step * (self.pages - index) as u32);
        Ok(noise(TARGET_WIDTH, Self::page_height(index), index as u64))
    }
}

/// Reads back the image XObject of PDFs produced by the PDF carrier.
pub struct XObjectRasterizer;

impl PageRasterizer for XObjectRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize> {
        Ok(Document::load(path)?.get_pages().len())
    }

    fn render_page(&self, path: &Path, index: usize, _zoom: f32) -> Result<RgbImage> {
        let doc = Document::load(path)?;
        let page_id = *doc
            .get_pages()
            .get(&(index as u32 + 1))
            .ok_or_else(|| AegisError::Renderer(format!("no page {index}")))?;

        let page = doc.get_object(page_id)?.as_dict()?;
        let xobjects = page.get(b"Resources")?.as_dict()?.get(b"XObject")?.as_dict()?;
        let image_ref = xobjects.get(b"Im0")?.as_reference()?;
        let stream = doc.get_object(image_ref)?.as_stream()?;

        let width = stream.dict.get(b"Width")?.as_i64()? as u32;
        let height = stream.dict.get(b"Height")?.as_i64()? as u32;
        let pixels = stream.decompressed_content()?;
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| AegisError::Renderer("pixel buffer size mismatch".into()))
    }
}

pub fn settings() -> CarrierSettings {
    CarrierSettings {
        target_width: TARGET_WIDTH,
        intensity: 5,
        min_asset_bytes: 50 * 1024,
        pdf_workers: 5,
    }
}

pub fn context(engine: Arc<dyn WatermarkEngine>, rasterizer: Arc<dyn PageRasterizer>) -> CarrierContext {
    CarrierContext::new(engine, rasterizer, settings())
}

pub fn identity_store(dir: &Path) -> IdentityStore {
    IdentityStore::new(dir.join("identities")).with_key_bits(2048)
}

/// Seeded random noise; compresses poorly, so PNG size tracks pixel count.
pub fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

pub fn write_png(path: &Path, img: &RgbImage) {
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Minimal PPTX-shaped archive with the given media entries.
pub fn write_pptx(path: &Path, media: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
    zip.start_file("ppt/slides/slide1.xml", options).unwrap();
    zip.write_all(b"<p:sld/>").unwrap();
    for (name, bytes) in media {
        zip.start_file(format!("ppt/media/{name}"), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub fn read_zip_entry(path: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    entry.read_to_end(&mut out).unwrap();
    out
}

pub fn zip_names(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn media_box_height(doc: &Document, page: lopdf::ObjectId) -> f32 {
    let media_box = doc
        .get_object(page)
        .unwrap()
        .as_dict()
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap();
    match &media_box[3] {
        Object::Real(v) => *v,
        Object::Integer(v) => *v as f32,
        other => panic!("unexpected MediaBox entry {other:?}"),
    }
}
