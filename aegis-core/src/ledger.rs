//! Distribution ledger
//!
//! SQLite-backed record of every (file, recipient, tracking id, key, outcome)
//! tuple produced by a distribution run.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::error::{AegisError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS distributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    recipient TEXT NOT NULL,
    tracking_id TEXT NOT NULL UNIQUE,
    key_used TEXT NOT NULL,
    timestamp DATETIME NOT NULL,
    status TEXT NOT NULL
)
"#;

/// Lifecycle of one distribution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionStatus {
    Pending,
    Success,
    MailFailed,
    EmbedFailed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::MailFailed => "MAIL_FAILED",
            Self::EmbedFailed => "EMBED_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown distribution status {0:?}")]
pub struct UnknownStatus(String);

impl FromStr for DistributionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "MAIL_FAILED" => Ok(Self::MailFailed),
            "EMBED_FAILED" => Ok(Self::EmbedFailed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for DistributionStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row of the `distributions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DistributionRecord {
    pub id: i64,
    pub filename: String,
    pub recipient: String,
    pub tracking_id: String,
    pub key_used: String,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: DistributionStatus,
}

/// Repository over the `distributions` table.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if needed) the ledger database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "Ledger opened");
        Self::from_pool(pool).await
    }

    /// Private in-memory ledger.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a `PENDING` record and return its id.
    pub async fn log(
        &self,
        filename: &str,
        recipient: &str,
        tracking_id: &str,
        key_used: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO distributions (filename, recipient, tracking_id, key_used, timestamp, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(filename)
        .bind(recipient)
        .bind(tracking_id)
        .bind(key_used)
        .bind(Utc::now())
        .bind(DistributionStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AegisError::DuplicateTrackingId(tracking_id.to_string())
            }
            other => AegisError::Database(other),
        })?;

        let id = result.last_insert_rowid();
        info!(id, recipient, tracking_id, "Distribution logged");
        Ok(id)
    }

    /// Settle a `PENDING` record. Each record moves out of `PENDING` once;
    /// a settled record keeps its status and yields [`AegisError::StatusSettled`].
    pub async fn update_status(&self, id: i64, status: DistributionStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE distributions SET status = ? WHERE id = ? AND status = 'PENDING'")
                .bind(status.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(match self.get(id).await? {
                Some(record) => AegisError::StatusSettled(id, record.status.to_string()),
                None => AegisError::LedgerMiss(format!("record #{id}")),
            });
        }
        debug!(id, status = %status, "Distribution status updated");
        Ok(())
    }

    /// First record (lowest id) whose tracking id contains `fragment`.
    ///
    /// Matching ignores ASCII case. A blank fragment matches nothing.
    pub async fn find_by_tracking_id(&self, fragment: &str) -> Result<Option<DistributionRecord>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }

        let record = sqlx::query_as::<_, DistributionRecord>(
            r#"
            SELECT * FROM distributions
            WHERE instr(upper(tracking_id), upper(?)) > 0
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(fragment)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(&self, id: i64) -> Result<Option<DistributionRecord>> {
        let record = sqlx::query_as::<_, DistributionRecord>(
            "SELECT * FROM distributions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Every record in insertion order.
    pub async fn list(&self) -> Result<Vec<DistributionRecord>> {
        let records =
            sqlx::query_as::<_, DistributionRecord>("SELECT * FROM distributions ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    pub async fn contains_tracking_id(&self, tracking_id: &str) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM distributions WHERE tracking_id = ?")
                .bind(tracking_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_starts_pending() {
        let ledger = Ledger::in_memory().await.unwrap();
        let id = ledger
            .log("report.pdf", "a@example.com", "A1B2C3D4", "secret")
            .await
            .unwrap();

        let record = ledger.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, DistributionStatus::Pending);
        assert_eq!(record.filename, "report.pdf");
        assert_eq!(record.key_used, "secret");
    }

    #[tokio::test]
    async fn test_duplicate_tracking_id_rejected() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.log("a", "r1", "DEADBEEF", "k").await.unwrap();
        let err = ledger.log("b", "r2", "DEADBEEF", "k").await.unwrap_err();
        assert!(matches!(err, AegisError::DuplicateTrackingId(_)));
        assert_eq!(ledger.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_substring_lookup_first_match() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.log("a", "first", "AB12CD34", "k").await.unwrap();
        ledger.log("b", "second", "FFAB12EE", "k").await.unwrap();

        let hit = ledger.find_by_tracking_id("2CD3").await.unwrap().unwrap();
        assert_eq!(hit.recipient, "first");

        let first = ledger.find_by_tracking_id("ab12").await.unwrap().unwrap();
        assert_eq!(first.recipient, "first");

        assert!(ledger.find_by_tracking_id("9999").await.unwrap().is_none());
        assert!(ledger.find_by_tracking_id("  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wildcards_are_literal() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.log("a", "r", "AB12CD34", "k").await.unwrap();
        assert!(ledger.find_by_tracking_id("%").await.unwrap().is_none());
        assert!(ledger.find_by_tracking_id("_").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status() {
        let ledger = Ledger::in_memory().await.unwrap();
        let id = ledger.log("a", "r", "0000FFFF", "k").await.unwrap();
        ledger
            .update_status(id, DistributionStatus::MailFailed)
            .await
            .unwrap();
        assert_eq!(
            ledger.get(id).await.unwrap().unwrap().status,
            DistributionStatus::MailFailed
        );
        assert!(matches!(
            ledger.update_status(id + 100, DistributionStatus::Success).await,
            Err(AegisError::LedgerMiss(_))
        ));
    }

    #[tokio::test]
    async fn test_settled_status_is_final() {
        let ledger = Ledger::in_memory().await.unwrap();
        let id = ledger.log("a", "r", "0000AAAA", "k").await.unwrap();
        ledger
            .update_status(id, DistributionStatus::Success)
            .await
            .unwrap();

        let err = ledger
            .update_status(id, DistributionStatus::MailFailed)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::StatusSettled(i, ref s) if i == id && s == "SUCCESS"));
        assert_eq!(
            ledger.get(id).await.unwrap().unwrap().status,
            DistributionStatus::Success
        );
    }

    #[tokio::test]
    async fn test_open_persists_to_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tracking.db");
        {
            let ledger = Ledger::open(&path).await.unwrap();
            ledger.log("a", "r", "CAFEBABE", "k").await.unwrap();
            ledger.close().await;
        }
        let reopened = Ledger::open(&path).await.unwrap();
        assert!(reopened.contains_tracking_id("CAFEBABE").await.unwrap());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "EMBED_FAILED".parse::<DistributionStatus>().unwrap(),
            DistributionStatus::EmbedFailed
        );
        assert!("DONE".parse::<DistributionStatus>().is_err());
        assert!(DistributionStatus::Success.is_terminal());
        assert!(!DistributionStatus::Pending.is_terminal());
    }
}
