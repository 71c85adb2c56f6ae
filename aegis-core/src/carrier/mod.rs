//! Carrier adapters.
//!
//! A carrier is the file being protected or inspected. Each adapter maps its
//! format onto one or more raster surfaces, runs the watermark engine per
//! surface, and reassembles the file.
//!
//! # Variants
//!
//! - **Image**: one surface, the whole picture.
//! - **PDF**: one surface per rendered page, processed on a bounded worker pool.
//! - **PPTX**: one surface per embedded media asset above a size threshold.
//!
//! # Failure model
//!
//! Whole-operation failures (unreadable input, corrupt archive) are returned
//! as errors. Per-surface engine failures are logged and degrade to "no
//! signal on this surface": `embed` yields `Ok(false)` only when no surface
//! could be watermarked, `extract` yields `Ok(None)` when no surface gave up
//! a payload.

mod raster;
mod pdf;
mod pptx;
pub mod surface;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::engine::{WatermarkEngine, DEFAULT_INTENSITY};
use crate::error::{AegisError, Result};
use crate::sniffer::{self, FileKind};

pub use self::raster::ImageCarrier;
pub use self::pdf::{
    concat_pdfs, image_page_pdf, PageRasterizer, PdfCarrier, PdftoppmRasterizer, RENDER_ZOOM,
};
pub use self::pptx::{PptxCarrier, MEDIA_PREFIX};

/// Width every surface is normalized to before the engine sees it.
pub const DEFAULT_TARGET_WIDTH: u32 = 1920;

/// PPTX media assets at or below this size are icons, not content.
pub const DEFAULT_MIN_ASSET_BYTES: u64 = 50 * 1024;

/// Common embed/extract contract.
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    /// Watermark `input` with `payload_text` under `key`, writing `output`.
    async fn embed(&self, input: &Path, output: &Path, payload_text: &str, key: &str)
        -> Result<bool>;

    /// Recover payload evidence, writing it to `output_hint` or a default
    /// path next to `input`. Returns the evidence path.
    async fn extract(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Option<PathBuf>>;
}

/// Tunables shared by all adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierSettings {
    pub target_width: u32,
    pub intensity: u8,
    pub min_asset_bytes: u64,
    pub pdf_workers: usize,
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            intensity: DEFAULT_INTENSITY,
            min_asset_bytes: DEFAULT_MIN_ASSET_BYTES,
            pdf_workers: default_workers(),
        }
    }
}

impl From<&Config> for CarrierSettings {
    fn from(config: &Config) -> Self {
        Self {
            target_width: config.target_width,
            intensity: config.intensity,
            min_asset_bytes: config.min_asset_bytes,
            pdf_workers: config.pdf_workers,
        }
    }
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Collaborators and tunables handed to every adapter.
#[derive(Clone)]
pub struct CarrierContext {
    pub engine: Arc<dyn WatermarkEngine>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub settings: CarrierSettings,
}

impl CarrierContext {
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

    pub fn carrier(&self, kind: CarrierKind) -> Carrier {
        Carrier::new(kind, self)
    }
}

/// Carrier formats with an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierKind {
    Image,
    Pdf,
    Pptx,
}

impl CarrierKind {
    pub fn from_file_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Image => Some(Self::Image),
            FileKind::Pdf => Some(Self::Pdf),
            FileKind::Pptx => Some(Self::Pptx),
            FileKind::Unknown => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("pptx") => Some(Self::Pptx),
            Some("pdf") => Some(Self::Pdf),
            Some("png" | "jpg" | "jpeg" | "bmp") => Some(Self::Image),
            _ => None,
        }
    }

    /// Default evidence file suffix appended to the input path.
    pub fn evidence_suffix(&self) -> &'static str {
        match self {
            Self::Image | Self::Pdf => raster::EVIDENCE_SUFFIX,
            Self::Pptx => pptx::EVIDENCE_SUFFIX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Pptx => "pptx",
        }
    }
}

impl std::fmt::Display for CarrierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a carrier's kind was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Magic bytes matched.
    Sniffed(CarrierKind),
    /// Sniffing failed; the file extension decided.
    Extension(CarrierKind),
    /// Sniffing failed but a signature trailer is present, so the carrier
    /// is treated as an image regardless of extension.
    Forced(CarrierKind),
}

impl Detection {
    /// Sniff `path`, falling back to its extension.
    pub fn resolve(path: &Path) -> Result<Self> {
        Self::resolve_with(path, false)
    }

    /// Like [`Detection::resolve`], but an unsniffable signed file is an image.
    pub fn resolve_with(path: &Path, signed: bool) -> Result<Self> {
        if let Some(kind) = CarrierKind::from_file_kind(sniffer::classify(path)) {
            return Ok(Self::Sniffed(kind));
        }
        if signed {
            return Ok(Self::Forced(CarrierKind::Image));
        }
        CarrierKind::from_extension(path)
            .map(Self::Extension)
            .ok_or_else(|| AegisError::FormatUnrecognized(path.display().to_string()))
    }

    pub fn kind(&self) -> CarrierKind {
        match self {
            Self::Sniffed(kind) | Self::Extension(kind) | Self::Forced(kind) => *kind,
        }
    }
}

/// Adapter dispatch over the supported formats.
pub enum Carrier {
    Image(ImageCarrier),
    Pdf(PdfCarrier),
    Pptx(PptxCarrier),
}

impl Carrier {
    pub fn new(kind: CarrierKind, ctx: &CarrierContext) -> Self {
        match kind {
            CarrierKind::Image => Self::Image(ImageCarrier::new(ctx.engine.clone(), ctx.settings)),
            CarrierKind::Pdf => Self::Pdf(PdfCarrier::new(
                ctx.engine.clone(),
                ctx.rasterizer.clone(),
                ctx.settings,
            )),
            CarrierKind::Pptx => Self::Pptx(PptxCarrier::new(ctx.engine.clone(), ctx.settings)),
        }
    }

    pub fn kind(&self) -> CarrierKind {
        match self {
            Self::Image(_) => CarrierKind::Image,
            Self::Pdf(_) => CarrierKind::Pdf,
            Self::Pptx(_) => CarrierKind::Pptx,
        }
    }

    fn adapter(&self) -> &dyn CarrierAdapter {
        match self {
            Self::Image(c) => c,
            Self::Pdf(c) => c,
            Self::Pptx(c) => c,
        }
    }
}

#[async_trait]
impl CarrierAdapter for Carrier {
    async fn embed(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
    ) -> Result<bool> {
        self.adapter().embed(input, output, payload_text, key).await
    }

    async fn extract(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        self.adapter().extract(input, key, output_hint).await
    }
}

/// Append `suffix` to the full file name of `input`.
///
/// `report.pdf` with `_wm.png` becomes `report.pdf_wm.png`.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Run blocking pixel work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AegisError::EngineFailure(format!("worker task failed: {e}")))?
}
