//! Single-image carrier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::surface::{embed_surface, extract_surface, load_surface, save_surface};
use super::{run_blocking, sibling_path, CarrierAdapter, CarrierSettings};
use crate::engine::{derive_seed, WatermarkEngine};
use crate::error::Result;

/// Evidence suffix for image and PDF carriers.
pub const EVIDENCE_SUFFIX: &str = "_wm.png";

/// The whole image is the single surface.
#[derive(Clone)]
pub struct ImageCarrier {
    engine: Arc<dyn WatermarkEngine>,
    settings: CarrierSettings,
}

impl ImageCarrier {
    pub fn new(engine: Arc<dyn WatermarkEngine>, settings: CarrierSettings) -> Self {
        Self { engine, settings }
    }

    /// Blocking embed of one image file. Used directly by the PPTX carrier.
    ///
    /// `format_hint` selects the encoder when `output` is a scratch path
    /// whose extension differs from the asset being replaced.
    pub fn embed_file(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
        format_hint: Option<&Path>,
    ) -> Result<bool> {
        let surface = load_surface(input)?;
        let seed = derive_seed(key);

        let marked = match embed_surface(
            self.engine.as_ref(),
            seed,
            &surface,
            payload_text,
            self.settings.target_width,
            self.settings.intensity,
        ) {
            Ok(marked) => marked,
            Err(e) => {
                warn!(path = %input.display(), error = %e, "Engine embed failed");
                return Ok(false);
            }
        };

        save_surface(&marked, output, format_hint)?;
        Ok(true)
    }

    /// Blocking extraction from decoded image bytes.
    pub fn extract_surface_to(
        &self,
        surface: &image::RgbImage,
        key: &str,
        evidence: &Path,
    ) -> Result<Option<PathBuf>> {
        let seed = derive_seed(key);
        match extract_surface(
            self.engine.as_ref(),
            seed,
            surface,
            self.settings.target_width,
        ) {
            Ok(bitmap) => {
                bitmap.save(evidence)?;
                Ok(Some(evidence.to_path_buf()))
            }
            Err(e) => {
                warn!(error = %e, "Engine extract failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CarrierAdapter for ImageCarrier {
    async fn embed(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
    ) -> Result<bool> {
        info!(path = %input.display(), "Processing image");
        let this = self.clone();
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        let (text, key) = (payload_text.to_string(), key.to_string());

        run_blocking(move || this.embed_file(&input, &output, &text, &key, None)).await
    }

    async fn extract(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        info!(path = %input.display(), "Extracting from image");
        let this = self.clone();
        let evidence = output_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(input, EVIDENCE_SUFFIX));
        let (input, key) = (input.to_path_buf(), key.to_string());

        run_blocking(move || {
            let surface = load_surface(&input)?;
            this.extract_surface_to(&surface, &key, &evidence)
        })
        .await
    }
}
