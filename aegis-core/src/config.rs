//! Runtime configuration
//!
//! Loaded from environment variables with sensible defaults. Command-line
//! flags in the binary override individual fields after loading.

use std::path::{Path, PathBuf};

use crate::carrier::{default_workers, DEFAULT_MIN_ASSET_BYTES, DEFAULT_TARGET_WIDTH};
use crate::engine::DEFAULT_INTENSITY;

/// Directory name for identities and the ledger under the user's home.
pub const DEFAULT_HOME_DIR: &str = ".aegis_identity";

/// Ledger file name inside the home directory.
pub const LEDGER_FILE: &str = "tracking.db";

/// Outbox directory name inside the home directory.
pub const OUTBOX_DIR: &str = "outbox";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Identity store directory (default: ~/.aegis_identity)
    pub home: PathBuf,
    /// Ledger database path (default: <home>/tracking.db)
    pub ledger: Option<PathBuf>,
    /// Outbox directory for the file mailer (default: <home>/outbox)
    pub outbox: Option<PathBuf>,
    /// PDF page workers (default: available parallelism)
    pub pdf_workers: usize,
    /// Surface normalization width in pixels (default: 1920)
    pub target_width: u32,
    /// Engine intensity (default: 5)
    pub intensity: u8,
    /// PPTX media assets at or below this size are skipped (default: 50 KiB)
    pub min_asset_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            ledger: None,
            outbox: None,
            pdf_workers: default_workers(),
            target_width: DEFAULT_TARGET_WIDTH,
            intensity: DEFAULT_INTENSITY,
            min_asset_bytes: DEFAULT_MIN_ASSET_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let home = lookup("AEGIS_HOME")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.home);

        let ledger = lookup("AEGIS_LEDGER")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let outbox = lookup("AEGIS_OUTBOX")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let pdf_workers = lookup("AEGIS_PDF_WORKERS")
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.pdf_workers);

        let target_width = lookup("AEGIS_TARGET_WIDTH")
            .and_then(|v| v.parse().ok())
            .filter(|&w: &u32| w > 0)
            .unwrap_or(defaults.target_width);

        let intensity = lookup("AEGIS_INTENSITY")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.intensity);

        let min_asset_bytes = lookup("AEGIS_MIN_ASSET_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_asset_bytes);

        Self {
            home,
            ledger,
            outbox,
            pdf_workers,
            target_width,
            intensity,
            min_asset_bytes,
        }
    }

    /// Use `home` for identities, and for the ledger and outbox unless set.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.home.join(LEDGER_FILE))
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.outbox
            .clone()
            .unwrap_or_else(|| self.home.join(OUTBOX_DIR))
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_HOME_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target_width, 1920);
        assert_eq!(config.intensity, 5);
        assert_eq!(config.min_asset_bytes, 50 * 1024);
        assert!(config.pdf_workers >= 1);
        assert!(config.home.ends_with(DEFAULT_HOME_DIR));
    }

    #[test]
    fn test_derived_paths_follow_home() {
        let config = Config::default().with_home("/srv/aegis");
        assert_eq!(config.ledger_path(), PathBuf::from("/srv/aegis/tracking.db"));
        assert_eq!(config.outbox_dir(), PathBuf::from("/srv/aegis/outbox"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("AEGIS_HOME", "/tmp/ids"),
            ("AEGIS_LEDGER", "/tmp/ledger.db"),
            ("AEGIS_PDF_WORKERS", "3"),
            ("AEGIS_TARGET_WIDTH", "1280"),
            ("AEGIS_INTENSITY", "9"),
        ]));
        assert_eq!(config.home, PathBuf::from("/tmp/ids"));
        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.outbox_dir(), PathBuf::from("/tmp/ids/outbox"));
        assert_eq!(config.pdf_workers, 3);
        assert_eq!(config.target_width, 1280);
        assert_eq!(config.intensity, 9);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("AEGIS_PDF_WORKERS", "0"),
            ("AEGIS_TARGET_WIDTH", "wide"),
            ("AEGIS_INTENSITY", "-1"),
        ]));
        let defaults = Config::default();
        assert_eq!(config.pdf_workers, defaults.pdf_workers);
        assert_eq!(config.target_width, 1920);
        assert_eq!(config.intensity, 5);
    }
}
