//! PDF carrier.
//!
//! Every page is rendered at [`RENDER_ZOOM`], normalized to the target
//! width, watermarked, and turned back into a single-page PDF whose
//! MediaBox is the pixel size divided by the zoom. Re-rendering such a page
//! at the same zoom reproduces the watermarked raster's dimensions.
//!
//! Pages fan out to a bounded pool of blocking workers. Each task opens the
//! source by path and returns `(page_index, bytes)`; the orchestrator sorts
//! by index before concatenating, so completion order never leaks into the
//! output.
//!
//! Engine work runs on blocking threads, which the engine's `Send + Sync`
//! bound allows. Rasterization stays out of process: [`PdftoppmRasterizer`]
//! spawns one `pdftoppm` child per page render.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::raster::EVIDENCE_SUFFIX;
use super::surface::{embed_surface, extract_surface};
use super::{run_blocking, sibling_path, CarrierAdapter, CarrierSettings};
use crate::engine::{derive_seed, WatermarkEngine};
use crate::error::{AegisError, Result};

/// Supersampling factor for page rendering (2x = 144 dpi).
pub const RENDER_ZOOM: f32 = 2.0;

/// Page rendering collaborator.
///
/// Implementations must be callable from several worker threads at once;
/// the bundled one isolates every render in its own child process.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<usize>;

    fn render_page(&self, path: &Path, index: usize, zoom: f32) -> Result<RgbImage>;
}

/// Renders pages with poppler's `pdftoppm`, one child process per page.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize> {
        let doc = Document::load(path)
            .map_err(|e| AegisError::CorruptContainer(format!("{}: {e}", path.display())))?;
        Ok(doc.get_pages().len())
    }

    fn render_page(&self, path: &Path, index: usize, zoom: f32) -> Result<RgbImage> {
        let scratch = tempfile::TempDir::new()?;
        let root = scratch.path().join("page");
        let page = (index + 1).to_string();
        let dpi = (72.0 * zoom).round().to_string();

        let output = Command::new(&self.program)
            .args(["-f", &page, "-l", &page, "-r", &dpi, "-png", "-singlefile"])
            .arg(path)
            .arg(&root)
            .output()
            .map_err(|e| AegisError::Renderer(format!("failed to run {}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(AegisError::Renderer(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let rendered = image::open(root.with_extension("png"))?;
        Ok(rendered.to_rgb8())
    }
}

/// One surface per page.
#[derive(Clone)]
pub struct PdfCarrier {
    engine: Arc<dyn WatermarkEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    settings: CarrierSettings,
}

impl PdfCarrier {
    pub fn new(
        engine: Arc<dyn WatermarkEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
        settings: CarrierSettings,
    ) -> Self {
        Self {
            engine,
            rasterizer,
            settings,
        }
    }

    /// Render, watermark, and re-wrap one page.
    fn process_page(&self, input: &Path, index: usize, text: &str, seed: u32) -> Result<Vec<u8>> {
        let surface = self.rasterizer.render_page(input, index, RENDER_ZOOM)?;
        let marked = embed_surface(
            self.engine.as_ref(),
            seed,
            &surface,
            text,
            self.settings.target_width,
            self.settings.intensity,
        )?;
        image_page_pdf(&marked, RENDER_ZOOM)
    }
}

#[async_trait]
impl CarrierAdapter for PdfCarrier {
    async fn embed(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
    ) -> Result<bool> {
        info!(path = %input.display(), "Processing PDF");

        let rasterizer = self.rasterizer.clone();
        let source = input.to_path_buf();
        let pages = run_blocking(move || rasterizer.page_count(&source)).await?;
        if pages == 0 {
            warn!(path = %input.display(), "PDF has no pages");
            return Ok(false);
        }

        let workers = self.settings.pdf_workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let seed = derive_seed(key);
        let mut tasks = JoinSet::new();
        debug!(pages, workers, "Fanning out PDF pages");

        for index in 0..pages {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AegisError::EngineFailure(format!("worker pool closed: {e}")))?;
            let this = self.clone();
            let source = input.to_path_buf();
            let text = payload_text.to_string();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                (index, this.process_page(&source, index, &text, seed))
            });
        }

        let mut results: Vec<(usize, Option<Vec<u8>>)> = Vec::with_capacity(pages);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(bytes))) => results.push((index, Some(bytes))),
                Ok((index, Err(e))) => {
                    warn!(page = index, error = %e, "Page embed failed");
                    results.push((index, None));
                }
                Err(e) => error!(error = %e, "Page task aborted"),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        let parts: Vec<Vec<u8>> = results.into_iter().filter_map(|(_, bytes)| bytes).collect();
        if parts.is_empty() {
            error!(path = %input.display(), "No page could be watermarked");
            return Ok(false);
        }
        if parts.len() < pages {
            warn!(kept = parts.len(), pages, "Some pages were dropped");
        }

        let merged = run_blocking(move || concat_pdfs(parts)).await?;
        tokio::fs::write(output, merged).await?;
        info!(path = %output.display(), pages, "Protected PDF saved");
        Ok(true)
    }

    /// Only the first page is examined; one page is sufficient evidence.
    async fn extract(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        info!(path = %input.display(), "Extracting from PDF (first page)");
        let this = self.clone();
        let evidence = output_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(input, EVIDENCE_SUFFIX));
        let (source, key) = (input.to_path_buf(), key.to_string());

        run_blocking(move || {
            if this.rasterizer.page_count(&source)? == 0 {
                return Ok(None);
            }
            let surface = match this.rasterizer.render_page(&source, 0, RENDER_ZOOM) {
                Ok(surface) => surface,
                Err(e) => {
                    warn!(error = %e, "First page render failed");
                    return Ok(None);
                }
            };
            match extract_surface(
                this.engine.as_ref(),
                derive_seed(&key),
                &surface,
                this.settings.target_width,
            ) {
                Ok(bitmap) => {
                    bitmap.save(&evidence)?;
                    Ok(Some(evidence))
                }
                Err(e) => {
                    warn!(error = %e, "Engine extract failed");
                    Ok(None)
                }
            }
        })
        .await
    }
}

/// Wrap a raster as a one-page PDF with a lossless (Flate) RGB image.
pub fn image_page_pdf(surface: &RgbImage, zoom: f32) -> Result<Vec<u8>> {
    let (width, height) = surface.dimensions();
    let page_w = width as f32 / zoom;
    let page_h = height as f32 / zoom;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(surface.as_raw())?;
    let pixels = encoder.finish()?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "FlateDecode",
        },
        pixels,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    page_w.into(),
                    0i64.into(),
                    0i64.into(),
                    page_h.into(),
                    0i64.into(),
                    0i64.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(page_w),
            Object::Real(page_h),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
}

/// Concatenate PDFs, keeping the order of `parts`.
pub fn concat_pdfs(parts: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for bytes in parts {
        let mut doc = Document::load_mem(&bytes)?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;
        page_ids.extend(doc.get_pages().into_values());
        objects.extend(doc.objects);
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);
    let mut merged = Document::with_version("1.5");

    for (id, object) in objects {
        match type_name(&object) {
            Some(b"Catalog") | Some(b"Pages") => continue,
            Some(b"Page") => {
                let mut dict = object.as_dict()?.clone();
                dict.set("Parent", pages_id);
                merged.objects.insert(id, Object::Dictionary(dict));
            }
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let count = page_ids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);
    merged.max_id = next_id + 1;

    let mut bytes = Vec::new();
    merged.save_to(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn media_box(doc: &Document, page: ObjectId) -> Vec<f32> {
        doc.get_object(page)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_float().unwrap())
            .collect()
    }

    #[test]
    fn test_image_page_pdf_dimensions() {
        let surface = RgbImage::from_pixel(200, 100, Rgb([1, 2, 3]));
        let bytes = image_page_pdf(&surface, 2.0).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(media_box(&doc, pages[&1]), vec![0.0, 0.0, 100.0, 50.0]);
    }

    #[test]
    fn test_concat_keeps_part_order() {
        let parts: Vec<Vec<u8>> = (1..=3)
            .map(|i| image_page_pdf(&RgbImage::new(40, 20 * i), 2.0).unwrap())
            .collect();
        let merged = concat_pdfs(parts).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        let heights: Vec<f32> = pages.values().map(|id| media_box(&doc, *id)[3]).collect();
        assert_eq!(heights, vec![10.0, 20.0, 30.0]);
    }
}
