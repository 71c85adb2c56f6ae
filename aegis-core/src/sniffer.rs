//! Magic-byte file type detection.
//!
//! Only a short header prefix is read. PPTX is recognized purely from the
//! ZIP local-file-header signature; the archive's internal layout is not
//! inspected.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Number of header bytes inspected.
pub const SNIFF_LEN: usize = 16;

const PNG_MAGIC: &[u8] = b"\x89PNG";
const JPEG_SOI: &[u8] = b"\xff\xd8\xff";
const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Carrier type as seen from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
    Pptx,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Pptx => "pptx",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a header prefix.
pub fn classify_bytes(header: &[u8]) -> FileKind {
    if header.starts_with(PNG_MAGIC) || header.starts_with(JPEG_SOI) {
        FileKind::Image
    } else if header.starts_with(PDF_MAGIC) {
        FileKind::Pdf
    } else if header.starts_with(ZIP_MAGIC) {
        FileKind::Pptx
    } else {
        FileKind::Unknown
    }
}

/// Classify the file at `path`. Never fails: unreadable files are `Unknown`.
pub fn classify(path: impl AsRef<Path>) -> FileKind {
    let path = path.as_ref();
    let mut header = Vec::with_capacity(SNIFF_LEN);
    let read = File::open(path).and_then(|f| f.take(SNIFF_LEN as u64).read_to_end(&mut header));

    match read {
        Ok(_) => classify_bytes(&header),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Sniff failed");
            FileKind::Unknown
        }
    }
}
