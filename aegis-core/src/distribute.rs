//! Per-recipient distribution.
//!
//! Each recipient gets a copy watermarked with its own tracking id. The
//! ledger row is written as `PENDING` before any work and moved to a
//! terminal status afterwards, so a crash mid-batch leaves an auditable
//! trail. Recipients are processed one at a time and a failure never stops
//! the batch.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::{AegisError, Result};
use crate::ledger::{DistributionStatus, Ledger};
use crate::mailer::Mailer;
use crate::pipeline::{Aegis, ProtectOptions};

/// Attempts at drawing a tracking id not yet in the ledger.
const TRACKING_ID_ATTEMPTS: usize = 5;

pub const DEFAULT_SUBJECT: &str = "Protected document";

/// Fresh 8-digit uppercase hex tracking id.
pub fn new_tracking_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    simple[..8].to_uppercase()
}

/// Payload text embedded for `tracking_id`.
pub fn tracking_payload(tracking_id: &str) -> String {
    format!("ID: {tracking_id}")
}

#[derive(Debug, Clone)]
pub struct DistributionRequest {
    pub input: PathBuf,
    pub key: String,
    pub sign: ProtectOptions,
    pub subject: String,
    pub body: String,
}

impl DistributionRequest {
    pub fn new(input: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            key: key.into(),
            sign: ProtectOptions::default(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: "Please find the attached document. This copy is registered to you."
                .to_string(),
        }
    }

    pub fn with_signing(mut self, options: ProtectOptions) -> Self {
        self.sign = options;
        self
    }

    fn filename(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// What happened for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub tracking_id: Option<String>,
    pub record_id: Option<i64>,
    pub status: DistributionStatus,
    pub error: Option<String>,
}

/// Runs distribution batches against one ledger and mailer.
pub struct Distributor<'a> {
    aegis: &'a Aegis,
    ledger: &'a Ledger,
    mailer: &'a dyn Mailer,
}

impl<'a> Distributor<'a> {
    pub fn new(aegis: &'a Aegis, ledger: &'a Ledger, mailer: &'a dyn Mailer) -> Self {
        Self {
            aegis,
            ledger,
            mailer,
        }
    }

    /// Distribute `request.input` to every recipient in order.
    pub async fn distribute(
        &self,
        request: &DistributionRequest,
        recipients: &[String],
    ) -> Vec<RecipientOutcome> {
        info!(
            input = %request.input.display(),
            recipients = recipients.len(),
            "Starting distribution"
        );
        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let outcome = self.distribute_one(request, recipient).await;
            info!(
                recipient = %outcome.recipient,
                status = %outcome.status,
                tracking_id = outcome.tracking_id.as_deref().unwrap_or("-"),
                "Recipient processed"
            );
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn distribute_one(&self, request: &DistributionRequest, recipient: &str) -> RecipientOutcome {
        let filename = request.filename();

        let (record_id, tracking_id) = match self.register(&filename, recipient, &request.key).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(recipient, error = %e, "Could not record distribution");
                return RecipientOutcome {
                    recipient: recipient.to_string(),
                    tracking_id: None,
                    record_id: None,
                    status: DistributionStatus::EmbedFailed,
                    error: Some(e.to_string()),
                };
            }
        };

        let (status, error) = match self.deliver(request, recipient, &filename, &tracking_id).await {
            Ok(()) => (DistributionStatus::Success, None),
            Err(Stage::Embed(e)) => {
                warn!(recipient, error = %e, "Embedding failed");
                (DistributionStatus::EmbedFailed, Some(e.to_string()))
            }
            Err(Stage::Mail(e)) => {
                warn!(recipient, error = %e, "Delivery failed");
                (DistributionStatus::MailFailed, Some(e.to_string()))
            }
        };

        if let Err(e) = self.ledger.update_status(record_id, status).await {
            error!(record_id, error = %e, "Could not update distribution status");
        }

        RecipientOutcome {
            recipient: recipient.to_string(),
            tracking_id: Some(tracking_id),
            record_id: Some(record_id),
            status,
            error,
        }
    }

    /// Log a `PENDING` row under a fresh tracking id.
    async fn register(&self, filename: &str, recipient: &str, key: &str) -> Result<(i64, String)> {
        let mut last = None;
        for _ in 0..TRACKING_ID_ATTEMPTS {
            let tracking_id = new_tracking_id();
            match self.ledger.log(filename, recipient, &tracking_id, key).await {
                Ok(id) => return Ok((id, tracking_id)),
                Err(AegisError::DuplicateTrackingId(id)) => {
                    warn!(tracking_id = %id, "Tracking id collision, drawing again");
                    last = Some(AegisError::DuplicateTrackingId(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| AegisError::DuplicateTrackingId(String::new())))
    }

    async fn deliver(
        &self,
        request: &DistributionRequest,
        recipient: &str,
        filename: &str,
        tracking_id: &str,
    ) -> std::result::Result<(), Stage> {
        let scratch = scratch_path(&request.input).map_err(Stage::Embed)?;

        self.aegis
            .protect(
                &request.input,
                &scratch,
                &tracking_payload(tracking_id),
                &request.key,
                &request.sign,
            )
            .await
            .map_err(Stage::Embed)?;

        self.mailer
            .send(recipient, &scratch, filename, &request.subject, &request.body)
            .await
            .map_err(Stage::Mail)?;

        Ok(())
    }
}

enum Stage {
    Embed(AegisError),
    Mail(AegisError),
}

/// Randomly named scratch file keeping the input's extension.
///
/// The file is removed when the returned path is dropped.
fn scratch_path(input: &Path) -> Result<tempfile::TempPath> {
    let suffix = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("aegis-dist-")
        .suffix(&suffix)
        .tempfile()?;
    Ok(file.into_temp_path())
}
