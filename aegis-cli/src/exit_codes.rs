//! Exit codes following sysexits.h conventions.
//!
//! Library errors are classified by variant; anything else falls back to
//! the context message attached by the command.

use aegis_core::AegisError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (no signal, unknown tracking id, corrupt container).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = match err.chain().find_map(|e| e.downcast_ref::<AegisError>()) {
            Some(aegis) => classify(aegis),
            None if message.contains("Failed to read") => INPUT_ERROR,
            None if message.contains("already exists") => USAGE_ERROR,
            None if message.contains("Failed to write") => IO_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

fn classify(err: &AegisError) -> i32 {
    match err {
        AegisError::FormatUnrecognized(_)
        | AegisError::CorruptContainer(_)
        | AegisError::NoSignalFound(_)
        | AegisError::SignatureAbsent
        | AegisError::SignatureInvalid(_)
        | AegisError::LedgerMiss(_)
        | AegisError::StatusSettled(..)
        | AegisError::Image(_)
        | AegisError::Zip(_)
        | AegisError::Pdf(_) => DATA_ERROR,
        AegisError::InvalidIdentityId(_) => USAGE_ERROR,
        AegisError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => INPUT_ERROR,
        AegisError::Io(_) => IO_ERROR,
        _ => GENERAL_ERROR,
    }
}
