//! Distribute command implementation.

use std::path::PathBuf;

use aegis_core::distribute::{DistributionRequest, Distributor, RecipientOutcome};
use aegis_core::{Aegis, Config, DistributionStatus, Ledger, OutboxMailer, ProtectOptions};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::info;

use crate::utils::{key_fingerprint, require_file};

pub struct Options {
    pub key: String,
    pub sign: bool,
    pub identity: Option<String>,
    pub subject: Option<String>,
}

/// Execute the distribute command.
///
/// Per-recipient failures are reported and recorded; the command fails only
/// when no recipient received a copy.
pub async fn execute(
    config: &Config,
    input: PathBuf,
    recipients: Vec<String>,
    options: Options,
    quiet: bool,
) -> Result<()> {
    require_file(&input)?;

    let ledger_path = config.ledger_path();
    let ledger = Ledger::open(&ledger_path)
        .await
        .context("Failed to open distribution ledger")?;
    let mailer = OutboxMailer::new(config.outbox_dir());
    let aegis = Aegis::from_config(config);

    let mut request = DistributionRequest::new(&input, options.key.as_str());
    if options.sign {
        request = request.with_signing(ProtectOptions::signed(options.identity));
    }
    if let Some(subject) = options.subject {
        request.subject = subject;
    }

    let outcomes = Distributor::new(&aegis, &ledger, &mailer)
        .distribute(&request, &recipients)
        .await;
    ledger.close().await;

    let delivered = outcomes
        .iter()
        .filter(|o| o.status == DistributionStatus::Success)
        .count();
    info!(delivered, total = outcomes.len(), "Distribution finished");

    if !quiet {
        println!();
        println!("   {} {}", "Document:".dimmed(), input.display());
        println!("   {} {}", "Key:".dimmed(), key_fingerprint(&options.key));
        println!("   {} {}", "Ledger:".dimmed(), ledger_path.display());
        println!("   {} {}", "Outbox:".dimmed(), mailer.outbox().display());
        println!();
        for outcome in &outcomes {
            print_outcome(outcome);
        }
        println!();
        println!(
            "   {} {}/{}",
            "Delivered:".dimmed(),
            delivered,
            outcomes.len()
        );
    }

    if delivered == 0 {
        bail!("Distribution failed for every recipient");
    }
    Ok(())
}

fn print_outcome(outcome: &RecipientOutcome) {
    let label = format!("{:<12}", outcome.status.as_str());
    let status = match outcome.status {
        DistributionStatus::Success => label.green(),
        DistributionStatus::Pending => label.yellow(),
        DistributionStatus::MailFailed | DistributionStatus::EmbedFailed => label.red(),
    };
    println!(
        "   {} {:<10} {}",
        status,
        outcome.tracking_id.as_deref().unwrap_or("-"),
        outcome.recipient
    );
    if let Some(error) = &outcome.error {
        println!("   {:<12} {}", "", error.as_str().dimmed());
    }
}
