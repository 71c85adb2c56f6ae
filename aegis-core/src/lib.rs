//! Aegis Core - Watermark protection and leak tracing library
//!
//! This crate embeds a hidden, per-recipient payload into documents, signs
//! the result, and later recovers the payload as leak evidence that can be
//! resolved back to a recipient through a distribution ledger.
//!
//! # Features
//!
//! - Carrier adapters for raster images, PDF (parallel per-page) and PPTX
//! - Pluggable watermark engine with a bundled block-DC QIM implementation
//! - Append-only RSA-PSS signature trailer with self-signed identities
//! - SQLite distribution ledger with substring tracking-id lookup
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use aegis_core::{Aegis, Config, ProtectOptions};
//!
//! # async fn example() -> aegis_core::Result<()> {
//! let aegis = Aegis::from_config(&Config::from_env());
//!
//! aegis
//!     .protect(
//!         Path::new("photo.png"),
//!         Path::new("photo_protected.png"),
//!         "ID: A1B2C3D4",
//!         "secret",
//!         &ProtectOptions::default(),
//!     )
//!     .await?;
//!
//! let inspection = aegis
//!     .inspect(Path::new("photo_protected.png"), "secret", None)
//!     .await?;
//! assert!(inspection.evidence.is_some());
//! # Ok(())
//! # }
//! ```

pub mod carrier;
pub mod config;
pub mod distribute;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod mailer;
pub mod pipeline;
pub mod signature;
pub mod sniffer;
pub mod trace;

// Re-export main types for convenience
pub use carrier::{
    Carrier, CarrierAdapter, CarrierContext, CarrierKind, CarrierSettings, Detection,
    PageRasterizer, PdftoppmRasterizer,
};
pub use config::Config;
pub use distribute::{DistributionRequest, Distributor, RecipientOutcome};
pub use engine::{derive_seed, DcQimEngine, PayloadBitmap, PayloadShape, WatermarkEngine};
pub use error::{AegisError, Result};
pub use identity::{Identity, IdentityStore, SignerInfo};
pub use ledger::{DistributionRecord, DistributionStatus, Ledger};
pub use mailer::{Mailer, OutboxMailer};
pub use pipeline::{Aegis, Inspection, ProtectOptions, ProtectReport, Verdict};
pub use signature::{SignatureBundle, SignatureStatus};
pub use sniffer::FileKind;
pub use trace::{trace, TraceReport};
