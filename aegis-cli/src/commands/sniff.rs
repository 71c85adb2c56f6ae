//! Sniff command implementation.

use std::path::PathBuf;

use aegis_core::sniffer;
use aegis_core::{AegisError, Detection};
use anyhow::Result;
use colored::Colorize;

use crate::utils::{describe_detection, require_file};

/// Print the carrier format `file` would be handled as.
pub fn execute(file: PathBuf, quiet: bool) -> Result<()> {
    require_file(&file)?;

    match Detection::resolve(&file) {
        Ok(detection) if quiet => println!("{}", detection.kind()),
        Ok(detection) => println!(
            "{}: {}",
            file.display(),
            describe_detection(&detection).green()
        ),
        Err(AegisError::FormatUnrecognized(_)) if quiet => println!("{}", sniffer::classify(&file)),
        Err(AegisError::FormatUnrecognized(_)) => println!(
            "{}: {}",
            file.display(),
            "unrecognized (not an image, PDF or PPTX)".yellow()
        ),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
