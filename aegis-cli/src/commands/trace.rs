//! Trace command implementation.

use std::path::PathBuf;

use aegis_core::trace::normalize_fragment;
use aegis_core::{trace, Aegis, AegisError, Config, Ledger};
use anyhow::{Context, Result};
use colored::Colorize;

use crate::utils::{describe_signature, format_timestamp, key_fingerprint, require_file};

/// Execute the trace command.
///
/// A fragment matching no ledger record is an error so scripts can tell a
/// resolved leak from an unresolved one.
pub async fn execute(
    config: &Config,
    input: PathBuf,
    fragment: String,
    key: String,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    require_file(&input)?;

    let ledger_path = config.ledger_path();
    let ledger = Ledger::open(&ledger_path)
        .await
        .context("Failed to open distribution ledger")?;
    let aegis = Aegis::from_config(config);

    let result = trace(&aegis, &ledger, &input, &key, &fragment, output.as_deref()).await;
    ledger.close().await;
    let report = result.context("Trace failed")?;

    if !quiet {
        println!();
        println!("   {} {}", "Leaked copy:".dimmed(), input.display());
        println!("   {} {}", "Format:".dimmed(), report.kind.as_str().to_uppercase());
        println!("   {} {}", "Key:".dimmed(), key_fingerprint(&key));
        println!(
            "   {} {}",
            "Signature:".dimmed(),
            describe_signature(&report.signature)
        );
        match &report.evidence {
            Some(path) => println!(
                "   {} {}",
                "Evidence:".dimmed(),
                path.display().to_string().cyan()
            ),
            None => println!("   {} {}", "Evidence:".dimmed(), "none recovered".yellow()),
        }
        println!();
    }

    let Some(record) = report.record else {
        if !quiet {
            println!("{}", "No distribution record matches this fragment.".red().bold());
        }
        return Err(AegisError::LedgerMiss(normalize_fragment(&fragment).to_string()).into());
    };

    if quiet {
        println!("{}", record.recipient);
    } else {
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!("{}", "║              LEAK TRACED               ║".green().bold());
        println!("{}", "╚════════════════════════════════════════╝".green());
        println!();
        println!("   {} {}", "Recipient:".dimmed(), record.recipient.bold());
        println!("   {} {}", "Tracking id:".dimmed(), record.tracking_id);
        println!("   {} {}", "Document:".dimmed(), record.filename);
        println!("   {} {}", "Sent at:".dimmed(), format_timestamp(&record.timestamp));
        println!("   {} {}", "Status:".dimmed(), record.status);
    }
    Ok(())
}
