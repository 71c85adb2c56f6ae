//! Signing identities on disk.
//!
//! Each identity is an RSA key pair plus a self-signed X.509 certificate,
//! stored as a PEM file pair in the store directory:
//!
//! | id        | private key           | certificate            |
//! |-----------|-----------------------|------------------------|
//! | `default` | `private.key`         | `identity.crt`         |
//! | `work`    | `private_work.key`    | `identity_work.crt`    |
//!
//! Private keys never leave this module except as an in-memory [`PKey`]
//! used for signing.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Name, X509NameBuilder, X509};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AegisError, Result};

/// Id of the unsuffixed identity.
pub const DEFAULT_IDENTITY: &str = "default";

/// Organization recorded in every certificate subject.
pub const ORGANIZATION: &str = "Aegis Protection";

pub const DEFAULT_KEY_BITS: u32 = 4096;

/// Certificate validity from creation.
pub const VALIDITY_DAYS: u32 = 365 * 20;

/// Subject details read back from a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    pub email: String,
    pub expiry: NaiveDate,
}

impl SignerInfo {
    pub fn from_certificate(cert: &X509) -> Result<Self> {
        let subject = cert.subject_name();
        Ok(Self {
            name: name_entry(subject, Nid::COMMONNAME)?,
            email: name_entry(subject, Nid::PKCS9_EMAILADDRESS)?,
            expiry: asn1_to_date(cert.not_after())?,
        })
    }
}

/// A loaded key pair and certificate.
pub struct Identity {
    pub id: String,
    pub private_key: PKey<Private>,
    pub certificate: X509,
}

impl Identity {
    pub fn certificate_pem(&self) -> Result<String> {
        let pem = self.certificate.to_pem()?;
        String::from_utf8(pem).map_err(|e| AegisError::Serialization(e.to_string()))
    }

    pub fn signer_info(&self) -> Result<SignerInfo> {
        SignerInfo::from_certificate(&self.certificate)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Directory of identity file pairs.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
    key_bits: u32,
}

impl IdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Override the RSA modulus size for newly created identities.
    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate a key pair and self-signed certificate for `id`.
    ///
    /// An existing pair with the same id is replaced. Returns the
    /// certificate path.
    pub fn create(&self, name: &str, email: &str, id: Option<&str>) -> Result<PathBuf> {
        let id = normalize_id(id)?;
        fs::create_dir_all(&self.dir)?;

        info!(id = %id, bits = self.key_bits, "Generating identity");
        let rsa = Rsa::generate(self.key_bits)?;
        let key_pem = rsa.private_key_to_pem()?;
        let pkey = PKey::from_rsa(rsa)?;

        let subject = build_subject(name, email)?;
        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let serial = {
            let mut bn = BigNum::new()?;
            bn.rand(159, MsbOption::MAYBE_ZERO, false)?;
            bn.to_asn1_integer()?
        };
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&subject)?;
        builder.set_issuer_name(&subject)?;
        builder.set_pubkey(&pkey)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.sign(&pkey, MessageDigest::sha256())?;
        let cert = builder.build();

        let (key_path, cert_path) = self.paths(&id);
        write_private(&key_path, &key_pem)?;
        fs::write(&cert_path, cert.to_pem()?)?;

        info!(id = %id, path = %cert_path.display(), "Identity created");
        Ok(cert_path)
    }

    /// Ids discovered from certificate files, sorted.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(id_from_cert_name) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    pub fn has_any(&self) -> bool {
        self.list().map(|ids| !ids.is_empty()).unwrap_or(false)
    }

    pub fn exists(&self, id: Option<&str>) -> bool {
        match normalize_id(id) {
            Ok(id) => {
                let (key, cert) = self.paths(&id);
                key.is_file() && cert.is_file()
            }
            Err(_) => false,
        }
    }

    /// Load `id` for signing, falling back to `default` when its key is absent.
    pub fn load(&self, id: Option<&str>) -> Result<Identity> {
        if !self.has_any() {
            return Err(AegisError::IdentityMissing(format!(
                "no identity in {}",
                self.dir.display()
            )));
        }

        let requested = normalize_id(id)?;
        let resolved = if self.paths(&requested).0.is_file() {
            requested
        } else {
            debug!(requested = %requested, "Identity not found, falling back to default");
            DEFAULT_IDENTITY.to_string()
        };

        let (key_path, cert_path) = self.paths(&resolved);
        if !key_path.is_file() || !cert_path.is_file() {
            return Err(AegisError::IdentityMissing(resolved));
        }

        let private_key = PKey::private_key_from_pem(&fs::read(&key_path)?)?;
        let certificate = X509::from_pem(&fs::read(&cert_path)?)?;
        Ok(Identity {
            id: resolved,
            private_key,
            certificate,
        })
    }

    /// Certificates of every listed identity, in list order.
    ///
    /// Unreadable certificates are skipped.
    pub fn certificates(&self) -> Result<Vec<(String, X509)>> {
        let mut out = Vec::new();
        for id in self.list()? {
            let (_, cert_path) = self.paths(&id);
            let loaded = fs::read(&cert_path)
                .map_err(AegisError::from)
                .and_then(|pem| X509::from_pem(&pem).map_err(AegisError::from));
            match loaded {
                Ok(cert) => out.push((id, cert)),
                Err(e) => debug!(id = %id, error = %e, "Skipping unreadable certificate"),
            }
        }
        Ok(out)
    }

    fn paths(&self, id: &str) -> (PathBuf, PathBuf) {
        let suffix = if id == DEFAULT_IDENTITY {
            String::new()
        } else {
            format!("_{id}")
        };
        (
            self.dir.join(format!("private{suffix}.key")),
            self.dir.join(format!("identity{suffix}.crt")),
        )
    }
}

fn normalize_id(id: Option<&str>) -> Result<String> {
    let id = id.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_IDENTITY);
    if id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(id.to_string())
    } else {
        Err(AegisError::InvalidIdentityId(id.to_string()))
    }
}

fn id_from_cert_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".crt")?.strip_prefix("identity")?;
    match stem.strip_prefix('_') {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        Some(_) => None,
        None if stem.is_empty() => Some(DEFAULT_IDENTITY.to_string()),
        None => None,
    }
}

fn build_subject(name: &str, email: &str) -> Result<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_nid(Nid::COMMONNAME, name)?;
    builder.append_entry_by_nid(Nid::PKCS9_EMAILADDRESS, email)?;
    builder.append_entry_by_nid(Nid::ORGANIZATIONNAME, ORGANIZATION)?;
    Ok(builder.build())
}

fn name_entry(name: &openssl::x509::X509NameRef, nid: Nid) -> Result<String> {
    let entry = name
        .entries_by_nid(nid)
        .next()
        .ok_or_else(|| AegisError::SignatureInvalid(format!("certificate lacks {nid:?}")))?;
    Ok(entry.data().as_utf8()?.to_string())
}

fn asn1_to_date(time: &Asn1TimeRef) -> Result<NaiveDate> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| AegisError::SignatureInvalid("certificate expiry out of range".into()))
}

#[cfg(unix)]
fn write_private(path: &Path, pem: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(pem)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, pem: &[u8]) -> Result<()> {
    fs::write(path, pem)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> IdentityStore {
        IdentityStore::new(dir.path()).with_key_bits(2048)
    }

    #[test]
    fn test_create_default_identity() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let cert_path = store.create("Alice", "alice@example.com", None).unwrap();
        assert_eq!(cert_path, dir.path().join("identity.crt"));
        assert!(dir.path().join("private.key").is_file());

        let identity = store.load(None).unwrap();
        let info = identity.signer_info().unwrap();
        assert_eq!(info.name, "Alice");
        assert_eq!(info.email, "alice@example.com");
        assert!(info.expiry.year() >= Utc::now().year() + 19);
    }

    #[test]
    fn test_list_named_identities_sorted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.has_any());

        store.create("Work", "w@example.com", Some("work")).unwrap();
        store.create("Alice", "a@example.com", None).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().collect();
        assert_eq!(ids, vec!["default", "work"]);
        assert!(store.has_any());
        assert!(store.exists(Some("work")));
        assert!(!store.exists(Some("home")));
    }

    #[test]
    fn test_load_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("Alice", "a@example.com", None).unwrap();

        let identity = store.load(Some("missing")).unwrap();
        assert_eq!(identity.id, DEFAULT_IDENTITY);
    }

    #[test]
    fn test_load_without_identities_is_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).load(None),
            Err(AegisError::IdentityMissing(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).create("X", "x@example.com", Some("../evil")),
            Err(AegisError::InvalidIdentityId(_))
        ));
    }

    #[test]
    fn test_id_from_cert_name() {
        assert_eq!(id_from_cert_name("identity.crt").as_deref(), Some("default"));
        assert_eq!(id_from_cert_name("identity_ops.crt").as_deref(), Some("ops"));
        assert_eq!(id_from_cert_name("identity_.crt"), None);
        assert_eq!(id_from_cert_name("private.key"), None);
        assert_eq!(id_from_cert_name("other.crt"), None);
    }
}
