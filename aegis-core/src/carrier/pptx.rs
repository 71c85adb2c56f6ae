//! PPTX carrier.
//!
//! A PPTX file is a ZIP archive. Embedding unpacks it into a scratch
//! directory, watermarks every qualifying image under `ppt/media/` in place,
//! and re-archives the directory with the original entry names and order.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::raster::ImageCarrier;
use super::surface::load_surface_from_memory;
use super::{run_blocking, sibling_path, CarrierAdapter, CarrierSettings};
use crate::engine::WatermarkEngine;
use crate::error::{AegisError, Result};

/// Archive directory holding slide media.
pub const MEDIA_PREFIX: &str = "ppt/media/";

/// Evidence suffix for PPTX carriers.
pub const EVIDENCE_SUFFIX: &str = "_extracted_wm.png";

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Upper bound on buffer pre-allocation from an entry's declared size.
const MAX_PREALLOC: u64 = 64 << 20;

/// One surface per qualifying media asset.
#[derive(Clone)]
pub struct PptxCarrier {
    image: ImageCarrier,
    min_asset_bytes: u64,
}

impl PptxCarrier {
    pub fn new(engine: Arc<dyn WatermarkEngine>, settings: CarrierSettings) -> Self {
        Self {
            image: ImageCarrier::new(engine, settings),
            min_asset_bytes: settings.min_asset_bytes,
        }
    }

    /// Whether an archive entry is a content image worth watermarking.
    pub fn is_target(&self, name: &str, size: u64) -> bool {
        name.starts_with(MEDIA_PREFIX) && is_image_name(name) && size > self.min_asset_bytes
    }

    fn embed_blocking(&self, input: &Path, output: &Path, text: &str, key: &str) -> Result<bool> {
        let mut archive = open_archive(input)?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            entries.push((entry.name().to_string(), entry.size(), entry.is_dir()));
        }

        let scratch = tempfile::TempDir::new()?;
        archive
            .extract(scratch.path())
            .map_err(|e| AegisError::CorruptContainer(format!("{}: {e}", input.display())))?;

        let mut marked = 0usize;
        for (name, size, is_dir) in &entries {
            if *is_dir || !self.is_target(name, *size) {
                continue;
            }
            let asset = scratch.path().join(name);
            debug!(asset = %name, bytes = size, "Watermarking inner image");
            match self.mark_asset(&asset, text, key) {
                Ok(true) => marked += 1,
                Ok(false) => warn!(asset = %name, "Inner image left unmarked"),
                Err(e) => warn!(asset = %name, error = %e, "Inner image failed"),
            }
        }
        if marked == 0 {
            warn!(path = %input.display(), "No qualifying media assets were watermarked");
        }

        rezip(scratch.path(), &entries, output)?;
        info!(path = %output.display(), assets = marked, "Protected PPTX saved");
        Ok(true)
    }

    /// Read original, write a scratch file beside it, replace the original.
    fn mark_asset(&self, asset: &Path, text: &str, key: &str) -> Result<bool> {
        let dir = asset.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".aegis-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        if !self
            .image
            .embed_file(asset, scratch.path(), text, key, Some(asset))?
        {
            return Ok(false);
        }
        scratch.persist(asset).map_err(|e| AegisError::Io(e.error))?;
        Ok(true)
    }

    fn extract_blocking(&self, input: &Path, key: &str, evidence: &Path) -> Result<Option<PathBuf>> {
        let mut archive = open_archive(input)?;

        let candidates: Vec<usize> = (0..archive.len())
            .filter(|&i| {
                archive
                    .by_index(i)
                    .map(|e| !e.is_dir() && self.is_target(e.name(), e.size()))
                    .unwrap_or(false)
            })
            .collect();
        debug!(candidates = candidates.len(), "Scanning media assets");

        for i in candidates {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(prealloc_len(entry.size()));
            entry.read_to_end(&mut bytes)?;

            let surface = match load_surface_from_memory(&bytes) {
                Ok(surface) => surface,
                Err(e) => {
                    warn!(asset = %name, error = %e, "Undecodable media asset");
                    continue;
                }
            };
            if let Some(path) = self.image.extract_surface_to(&surface, key, evidence)? {
                info!(asset = %name, evidence = %path.display(), "Found trace");
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl CarrierAdapter for PptxCarrier {
    async fn embed(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
    ) -> Result<bool> {
        info!(path = %input.display(), "Processing PPTX");
        let this = self.clone();
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        let (text, key) = (payload_text.to_string(), key.to_string());

        run_blocking(move || this.embed_blocking(&input, &output, &text, &key)).await
    }

    async fn extract(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        info!(path = %input.display(), "Extracting from PPTX");
        let this = self.clone();
        let evidence = output_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(input, EVIDENCE_SUFFIX));
        let (input, key) = (input.to_path_buf(), key.to_string());

        run_blocking(move || this.extract_blocking(&input, &key, &evidence)).await
    }
}

/// Declared sizes come from the archive and are not trusted.
fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| match e {
        ZipError::Io(io) => AegisError::Io(io),
        other => AegisError::CorruptContainer(format!("{}: {other}", path.display())),
    })
}

/// Re-archive `root`, writing entries in the original order and names.
fn rezip(root: &Path, entries: &[(String, u64, bool)], output: &Path) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, _, is_dir) in entries {
        if *is_dir {
            writer.add_directory(name.as_str(), options)?;
            continue;
        }
        writer.start_file(name.as_str(), options)?;
        let mut source = File::open(root.join(name))?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}
