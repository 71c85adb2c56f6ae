//! Embed command implementation.

use std::path::PathBuf;

use aegis_core::{Aegis, Config, ProtectOptions};
use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::utils::{describe_detection, key_fingerprint, require_file};

pub struct Options {
    pub text: String,
    pub key: String,
    pub sign: bool,
    pub identity: Option<String>,
}

/// Execute the embed command.
pub async fn execute(
    config: &Config,
    input: PathBuf,
    output: PathBuf,
    options: Options,
    quiet: bool,
) -> Result<()> {
    require_file(&input)?;

    let protect = if options.sign {
        ProtectOptions::signed(options.identity)
    } else {
        ProtectOptions::default()
    };

    let aegis = Aegis::from_config(config);
    let report = aegis
        .protect(&input, &output, &options.text, &options.key, &protect)
        .await
        .context("Embedding failed")?;

    info!(output = %report.output.display(), "Protected copy written");

    if !quiet {
        println!();
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!("{}", "║              PROTECTED                 ║".green().bold());
        println!("{}", "╚════════════════════════════════════════╝".green());
        println!();
        println!("   {} {}", "Input:".dimmed(), input.display());
        println!("   {} {}", "Format:".dimmed(), describe_detection(&report.detection));
        println!("   {} {}", "Payload:".dimmed(), options.text);
        println!("   {} {}", "Key:".dimmed(), key_fingerprint(&options.key));
        match &report.signed_by {
            Some(id) => println!("   {} {}", "Signed by:".dimmed(), id.green()),
            None => println!("   {} {}", "Signed by:".dimmed(), "not signed".dimmed()),
        }
        println!("   {} {}", "Output:".dimmed(), report.output.display().to_string().cyan());
    }

    Ok(())
}
