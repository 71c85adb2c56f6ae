//! Common utility functions shared across CLI commands.

use std::path::Path;

use aegis_core::{Detection, SignatureStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use sha2::{Digest, Sha256};

/// Display form of a secret key that never shows more than its last three characters.
///
/// `1234567` becomes `SHA256(***567) 8bb0cf6e`, the trailing part being the
/// first four bytes of the key's SHA-256 digest.
pub fn key_fingerprint(key: &str) -> String {
    let tail: String = {
        let chars: Vec<char> = key.chars().collect();
        chars[chars.len().saturating_sub(3)..].iter().collect()
    };
    let digest = Sha256::digest(key.as_bytes());
    format!("SHA256(***{tail}) {}", hex::encode(&digest[..4]))
}

/// `IMAGE (magic bytes)` and the like.
pub fn describe_detection(detection: &Detection) -> String {
    let how = match detection {
        Detection::Sniffed(_) => "magic bytes",
        Detection::Extension(_) => "file extension",
        Detection::Forced(_) => "signed, assumed image",
    };
    format!("{} ({how})", detection.kind().as_str().to_uppercase())
}

/// Coloured signature line for reports.
pub fn describe_signature(status: &SignatureStatus) -> ColoredString {
    match status {
        SignatureStatus::None => "Not signed".dimmed(),
        SignatureStatus::Valid(signer) => format!(
            "Valid ({} <{}>, certificate until {})",
            signer.name, signer.email, signer.expiry
        )
        .green(),
        SignatureStatus::Invalid(reason) => format!("INVALID ({reason})").red().bold(),
        SignatureStatus::Error(reason) => format!("Unreadable ({reason})").yellow(),
    }
}

/// Fail with an input error unless `path` is a readable file.
pub fn require_file(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("Failed to read file: {} is not a regular file", path.display());
    }
    Ok(())
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::CarrierKind;
    use chrono::TimeZone;

    #[test]
    fn test_key_fingerprint_hides_key() {
        let fp = key_fingerprint("correct-horse");
        assert!(fp.starts_with("SHA256(***rse) "));
        assert!(!fp.contains("correct"));
        assert_eq!(fp.len(), "SHA256(***rse) ".len() + 8);

        assert!(key_fingerprint("1").starts_with("SHA256(***1) "));
        assert!(key_fingerprint("").starts_with("SHA256(***) "));
    }

    #[test]
    fn test_describe_detection() {
        assert_eq!(
            describe_detection(&Detection::Sniffed(CarrierKind::Pdf)),
            "PDF (magic bytes)"
        );
        assert_eq!(
            describe_detection(&Detection::Extension(CarrierKind::Pptx)),
            "PPTX (file extension)"
        );
    }

    #[test]
    fn test_require_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = require_file(&dir.path().join("missing.png")).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
        assert!(require_file(dir.path()).is_err());
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-15 12:30:45 UTC");
    }
}
