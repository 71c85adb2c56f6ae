//! Delivery of protected copies to recipients.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::{AegisError, Result};

/// Delivers one attachment to one recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// `filename` is the name the recipient sees, independent of the
    /// scratch path the attachment currently lives at.
    async fn send(
        &self,
        recipient: &str,
        attachment: &Path,
        filename: &str,
        subject: &str,
        body: &str,
    ) -> Result<()>;
}

/// Drops each attachment into `<outbox>/<recipient>/<filename>`.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    outbox: PathBuf,
}

impl OutboxMailer {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    /// Where a delivered attachment lands.
    pub fn delivery_path(&self, recipient: &str, filename: &str) -> Result<PathBuf> {
        let folder = sanitize_component(recipient)
            .ok_or_else(|| AegisError::Mail(format!("unusable recipient {recipient:?}")))?;
        let name = sanitize_component(filename)
            .ok_or_else(|| AegisError::Mail(format!("unusable filename {filename:?}")))?;
        Ok(self.outbox.join(folder).join(name))
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(
        &self,
        recipient: &str,
        attachment: &Path,
        filename: &str,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        let target = self.delivery_path(recipient, filename)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(attachment, &target)
            .await
            .map_err(|e| AegisError::Mail(format!("{recipient}: {e}")))?;

        let note = note_path(&target);
        tokio::fs::write(&note, format!("Subject: {subject}\n\n{body}\n")).await?;

        info!(recipient, path = %target.display(), "Delivered to outbox");
        Ok(())
    }
}

/// Sidecar holding the message text: the full delivered file name plus
/// `.txt`, so `report.pdf` and `report.png` never share a note.
fn note_path(delivered: &Path) -> PathBuf {
    let mut name = delivered
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".txt");
    delivered.with_file_name(name)
}

/// A single safe path component, or `None` if nothing usable remains.
fn sanitize_component(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a@example.com").as_deref(), Some("a@example.com"));
        assert_eq!(sanitize_component("../x").as_deref(), Some(".._x"));
        assert_eq!(sanitize_component(".."), None);
        assert_eq!(sanitize_component("  "), None);
    }

    #[test]
    fn test_note_keeps_full_file_name() {
        assert_eq!(
            note_path(Path::new("/out/bob/report.pdf")),
            PathBuf::from("/out/bob/report.pdf.txt")
        );
        assert_ne!(
            note_path(Path::new("/out/bob/report.pdf")),
            note_path(Path::new("/out/bob/report.png"))
        );
    }

    #[tokio::test]
    async fn test_outbox_delivery() {
        let dir = tempfile::TempDir::new().unwrap();
        let attachment = dir.path().join("scratch.bin");
        std::fs::write(&attachment, b"protected").unwrap();

        let mailer = OutboxMailer::new(dir.path().join("outbox"));
        mailer
            .send("bob@example.com", &attachment, "report.pdf", "Subject", "Body")
            .await
            .unwrap();

        let delivered = dir.path().join("outbox/bob@example.com/report.pdf");
        assert_eq!(std::fs::read(&delivered).unwrap(), b"protected");
        let note = std::fs::read_to_string(dir.path().join("outbox/bob@example.com/report.pdf.txt"))
            .unwrap();
        assert!(note.starts_with("Subject: Subject"));
    }

    #[tokio::test]
    async fn test_missing_attachment_is_mail_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mailer = OutboxMailer::new(dir.path());
        let err = mailer
            .send("bob", &dir.path().join("absent"), "x.png", "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::Mail(_)));
    }
}
