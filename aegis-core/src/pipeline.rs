//! End-to-end protect and inspect operations.
//!
//! [`Aegis`] ties carrier dispatch to the signature trailer: protecting a
//! file embeds the payload and optionally signs the result, inspecting a
//! file reads the trailer first and then recovers payload evidence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::carrier::{
    run_blocking, sibling_path, CarrierAdapter, CarrierContext, CarrierSettings, Detection,
    PageRasterizer, PdftoppmRasterizer,
};
use crate::config::Config;
use crate::engine::{DcQimEngine, WatermarkEngine};
use crate::error::{AegisError, Result};
use crate::identity::IdentityStore;
use crate::signature::{self, SignatureStatus};

/// Signing choice for [`Aegis::protect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectOptions {
    pub sign: bool,
    /// Identity to sign with; `None` means `default`.
    pub identity: Option<String>,
}

impl ProtectOptions {
    pub fn signed(identity: Option<String>) -> Self {
        Self {
            sign: true,
            identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectReport {
    pub detection: Detection,
    pub output: PathBuf,
    /// Identity id used for the trailer, if signed.
    pub signed_by: Option<String>,
}

/// Evidence status as reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    FoundVerified,
    FoundUnverified,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub detection: Detection,
    pub signature: SignatureStatus,
    pub evidence: Option<PathBuf>,
}

impl Inspection {
    pub fn verdict(&self) -> Verdict {
        match (&self.evidence, self.signature.is_valid()) {
            (None, _) => Verdict::NotFound,
            (Some(_), true) => Verdict::FoundVerified,
            (Some(_), false) => Verdict::FoundUnverified,
        }
    }
}

/// Protect/inspect facade over the carrier adapters and identity store.
#[derive(Clone)]
pub struct Aegis {
    ctx: CarrierContext,
    identities: IdentityStore,
}

impl Aegis {
    pub fn new(ctx: CarrierContext, identities: IdentityStore) -> Self {
        Self { ctx, identities }
    }

    /// Bundled engine and `pdftoppm` renderer, tuned by `config`.
    pub fn from_config(config: &Config) -> Self {
        let settings = CarrierSettings::from(config);
        let engine: Arc<dyn WatermarkEngine> =
            Arc::new(DcQimEngine::with_intensity(settings.intensity));
        let rasterizer: Arc<dyn PageRasterizer> = Arc::new(PdftoppmRasterizer::default());
        Self::new(
            CarrierContext::new(engine, rasterizer, settings),
            IdentityStore::new(config.home()),
        )
    }

    pub fn context(&self) -> &CarrierContext {
        &self.ctx
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    /// Embed `payload_text` into `input`, writing `output`, then sign it if asked.
    ///
    /// A carrier whose every surface failed is an [`AegisError::EngineFailure`].
    pub async fn protect(
        &self,
        input: &Path,
        output: &Path,
        payload_text: &str,
        key: &str,
        options: &ProtectOptions,
    ) -> Result<ProtectReport> {
        let detection = Detection::resolve(input)?;

        // Load the identity before any pixel work.
        let identity = if options.sign {
            let store = self.identities.clone();
            let id = options.identity.clone();
            Some(run_blocking(move || store.load(id.as_deref())).await?)
        } else {
            None
        };

        let carrier = self.ctx.carrier(detection.kind());
        if !carrier.embed(input, output, payload_text, key).await? {
            return Err(AegisError::EngineFailure(format!(
                "no surface of {} could be watermarked",
                input.display()
            )));
        }

        let signed_by = match identity {
            Some(identity) => {
                let target = output.to_path_buf();
                let id = identity.id.clone();
                run_blocking(move || signature::attach(&target, &identity)).await?;
                Some(id)
            }
            None => None,
        };

        info!(
            input = %input.display(),
            output = %output.display(),
            kind = %detection.kind(),
            signed = signed_by.is_some(),
            "Protection complete"
        );
        Ok(ProtectReport {
            detection,
            output: output.to_path_buf(),
            signed_by,
        })
    }

    /// Verify the trailer and recover payload evidence from `input`.
    ///
    /// A signed carrier is stripped of its trailer into a scratch copy before
    /// extraction; the evidence path is still derived from `input`.
    pub async fn inspect(
        &self,
        input: &Path,
        key: &str,
        output_hint: Option<&Path>,
    ) -> Result<Inspection> {
        let path = input.to_path_buf();
        let signature = run_blocking(move || Ok(signature::recover(&path))).await?;
        let signed = !matches!(signature, SignatureStatus::None);

        let detection = Detection::resolve_with(input, signed)?;
        let kind = detection.kind();
        let evidence_path = output_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(input, kind.evidence_suffix()));

        let carrier = self.ctx.carrier(kind);
        let evidence = if signed {
            let scratch = stripped_copy(input).await?;
            carrier
                .extract(&scratch, key, Some(&evidence_path))
                .await?
        } else {
            carrier.extract(input, key, Some(&evidence_path)).await?
        };

        if evidence.is_none() {
            warn!(path = %input.display(), "No watermark signal recovered");
        }
        Ok(Inspection {
            detection,
            signature,
            evidence,
        })
    }
}

/// Carrier bytes of a signed file in a scratch file with the same extension.
async fn stripped_copy(input: &Path) -> Result<tempfile::TempPath> {
    let input = input.to_path_buf();
    run_blocking(move || {
        let bytes = std::fs::read(&input)?;
        let suffix = input
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut scratch = tempfile::Builder::new()
            .prefix("aegis-carrier-")
            .suffix(&suffix)
            .tempfile()?;
        std::io::Write::write_all(&mut scratch, signature::strip_trailer(&bytes))?;
        Ok(scratch.into_temp_path())
    })
    .await
}
