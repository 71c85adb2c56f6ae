//! Leak tracing.
//!
//! Recovers payload evidence from a leaked copy and resolves the tracking
//! id fragment a human (or OCR) read off that evidence through the ledger.

use std::path::Path;

use tracing::info;

use crate::carrier::CarrierKind;
use crate::error::Result;
use crate::ledger::{DistributionRecord, Ledger};
use crate::pipeline::{Aegis, Inspection};
use crate::signature::SignatureStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    pub kind: CarrierKind,
    pub evidence: Option<std::path::PathBuf>,
    pub signature: SignatureStatus,
    /// `None` is a ledger miss.
    pub record: Option<DistributionRecord>,
}

impl TraceReport {
    pub fn is_match(&self) -> bool {
        self.record.is_some()
    }
}

/// Strip a leading `ID:` label and surrounding whitespace from a fragment.
pub fn normalize_fragment(fragment: &str) -> &str {
    let trimmed = fragment.trim();
    let unlabeled = trimmed
        .strip_prefix("ID:")
        .or_else(|| trimmed.strip_prefix("id:"))
        .unwrap_or(trimmed);
    unlabeled.trim()
}

/// Extract evidence from `leaked` and look up `fragment` in `ledger`.
pub async fn trace(
    aegis: &Aegis,
    ledger: &Ledger,
    leaked: &Path,
    key: &str,
    fragment: &str,
    evidence_out: Option<&Path>,
) -> Result<TraceReport> {
    let Inspection {
        detection,
        signature,
        evidence,
    } = aegis.inspect(leaked, key, evidence_out).await?;

    let fragment = normalize_fragment(fragment);
    let record = ledger.find_by_tracking_id(fragment).await?;
    match &record {
        Some(r) => info!(
            fragment,
            recipient = %r.recipient,
            tracking_id = %r.tracking_id,
            "Leak traced"
        ),
        None => info!(fragment, "No distribution record matches"),
    }

    Ok(TraceReport {
        kind: detection.kind(),
        evidence,
        signature,
        record,
    })
}
