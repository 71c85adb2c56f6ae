//! Extract command implementation.

use std::path::PathBuf;

use aegis_core::{Aegis, AegisError, Config, Inspection, Verdict};
use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use crate::utils::{describe_detection, describe_signature, key_fingerprint, require_file};

/// Execute the extract command.
///
/// A missing signal is an error; an invalid signature next to recovered
/// evidence is reported but does not fail the command.
pub async fn execute(
    config: &Config,
    input: PathBuf,
    output: Option<PathBuf>,
    key: String,
    quiet: bool,
) -> Result<()> {
    require_file(&input)?;

    let aegis = Aegis::from_config(config);
    let inspection = aegis
        .inspect(&input, &key, output.as_deref())
        .await
        .context("Extraction failed")?;

    let verdict = inspection.verdict();
    match verdict {
        Verdict::FoundVerified => info!("Watermark recovered from a verified copy"),
        Verdict::FoundUnverified => warn!(
            signature = inspection.signature.as_str(),
            "Watermark recovered from an unverified copy"
        ),
        Verdict::NotFound => warn!("No watermark recovered"),
    }

    if !quiet {
        print_report(&input, &key, &inspection, verdict);
    }

    if verdict == Verdict::NotFound {
        return Err(AegisError::NoSignalFound(input.display().to_string()).into());
    }
    Ok(())
}

fn print_report(input: &std::path::Path, key: &str, inspection: &Inspection, verdict: Verdict) {
    let banner = match verdict {
        Verdict::FoundVerified => "║         WATERMARK FOUND (VERIFIED)     ║".green().bold(),
        Verdict::FoundUnverified => "║            WATERMARK FOUND             ║".yellow().bold(),
        Verdict::NotFound => "║          NO WATERMARK FOUND            ║".red().bold(),
    };
    let frame = |s: &str| match verdict {
        Verdict::FoundVerified => s.green(),
        Verdict::FoundUnverified => s.yellow(),
        Verdict::NotFound => s.red(),
    };

    println!();
    println!("{}", frame("╔════════════════════════════════════════╗"));
    println!("{banner}");
    println!("{}", frame("╚════════════════════════════════════════╝"));
    println!();
    println!("   {} {}", "Target:".dimmed(), input.display());
    println!(
        "   {} {}",
        "Format:".dimmed(),
        describe_detection(&inspection.detection)
    );
    println!("   {} {}", "Key:".dimmed(), key_fingerprint(key));
    println!(
        "   {} {}",
        "Signature:".dimmed(),
        describe_signature(&inspection.signature)
    );
    match &inspection.evidence {
        Some(path) => {
            println!(
                "   {} {}",
                "Evidence:".dimmed(),
                path.display().to_string().cyan()
            );
            println!();
            println!(
                "   {}",
                "Open the evidence image and read the payload text.".dimmed()
            );
        }
        None => println!(
            "   {} {}",
            "Evidence:".dimmed(),
            "none (wrong key or no watermark)".red()
        ),
    }
}
