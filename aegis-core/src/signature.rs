//! Signature trailer framing.
//!
//! A signed carrier is laid out as:
//!
//! ```text
//! <carrier bytes> 0x00 "--AEGIS-SIGNATURE-DATA--" {"sig": <base64>, "cert": <PEM>}
//! ```
//!
//! The signature is RSA-PSS (MGF1-SHA256, maximum salt length) over the
//! SHA-256 digest of the carrier bytes. Recovery splits on the last marker
//! occurrence, so re-attaching appends a new bundle whose signed region
//! includes the earlier trailer.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{AegisError, Result};
use crate::identity::{Identity, IdentityStore, SignerInfo};

/// Separator between carrier bytes and the JSON bundle.
pub const BOUNDARY: &[u8] = b"\x00--AEGIS-SIGNATURE-DATA--";

/// Detached signature plus the signer's certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    /// Base64 RSA-PSS signature.
    pub sig: String,
    /// PEM certificate of the signer.
    pub cert: String,
}

impl SignatureBundle {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AegisError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| AegisError::SignatureInvalid(e.to_string()))
    }
}

/// Outcome of reading a file's trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// No boundary marker in the file.
    None,
    /// Signature verified against the embedded certificate.
    Valid(SignerInfo),
    /// Trailer present but unparseable or cryptographically wrong.
    Invalid(String),
    /// The file could not be read.
    Error(String),
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Valid(_) => "valid",
            Self::Invalid(_) => "invalid",
            Self::Error(_) => "error",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn signer(&self) -> Option<&SignerInfo> {
        match self {
            Self::Valid(info) => Some(info),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split at the last boundary marker into `(carrier, bundle_json)`.
pub fn split_trailer(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = rfind(bytes, BOUNDARY)?;
    Some((&bytes[..pos], &bytes[pos + BOUNDARY.len()..]))
}

/// Carrier bytes with the most recent trailer removed.
pub fn strip_trailer(bytes: &[u8]) -> &[u8] {
    split_trailer(bytes).map(|(carrier, _)| carrier).unwrap_or(bytes)
}

/// Sign `bytes` with `identity`, producing a bundle.
pub fn sign_bytes(identity: &Identity, bytes: &[u8]) -> Result<SignatureBundle> {
    let signature = pss_sign(&identity.private_key, bytes)?;
    Ok(SignatureBundle {
        sig: BASE64.encode(signature),
        cert: identity.certificate_pem()?,
    })
}

/// Append a signature trailer for the current contents of `path`.
pub fn attach(path: &Path, identity: &Identity) -> Result<()> {
    let bytes = fs::read(path)?;
    let bundle = sign_bytes(identity, &bytes)?;
    let json = bundle.to_json()?;

    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(BOUNDARY)?;
    file.write_all(&json)?;
    file.flush()?;

    info!(path = %path.display(), identity = %identity.id, "Signature attached");
    Ok(())
}

/// Read and verify the trailer of `path`.
pub fn recover(path: &Path) -> SignatureStatus {
    match fs::read(path) {
        Ok(bytes) => recover_bytes(&bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read file for signature check");
            SignatureStatus::Error(e.to_string())
        }
    }
}

/// Verify the trailer of an in-memory file against its embedded certificate.
pub fn recover_bytes(bytes: &[u8]) -> SignatureStatus {
    let Some((carrier, json)) = split_trailer(bytes) else {
        return SignatureStatus::None;
    };

    match verify_bundle(carrier, json) {
        Ok(info) => SignatureStatus::Valid(info),
        Err(e) => {
            debug!(error = %e, "Signature trailer rejected");
            SignatureStatus::Invalid(e.to_string())
        }
    }
}

fn verify_bundle(carrier: &[u8], json: &[u8]) -> Result<SignerInfo> {
    let bundle = SignatureBundle::from_json(json)?;
    let cert = X509::from_pem(bundle.cert.as_bytes())
        .map_err(|e| AegisError::SignatureInvalid(format!("certificate: {e}")))?;
    let signature = decode_signature(&bundle.sig)?;
    let key = cert.public_key()?;

    if !pss_verify(&key, carrier, &signature)? {
        return Err(AegisError::SignatureInvalid(
            "signature does not match content".into(),
        ));
    }
    SignerInfo::from_certificate(&cert)
}

/// Verify a detached signature over `bytes`.
///
/// With `cert_pem`, only that certificate is tried. Without it, every
/// identity in `store` is tried in list order and the first match wins.
/// Returns `Ok(None)` when nothing verifies.
pub fn verify_detached(
    bytes: &[u8],
    sig_b64: &str,
    cert_pem: Option<&str>,
    store: &IdentityStore,
) -> Result<Option<SignerInfo>> {
    let signature = match decode_signature(sig_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!(error = %e, "Detached signature is not base64");
            return Ok(None);
        }
    };

    if let Some(pem) = cert_pem {
        let cert = match X509::from_pem(pem.as_bytes()) {
            Ok(cert) => cert,
            Err(e) => {
                debug!(error = %e, "Detached certificate unreadable");
                return Ok(None);
            }
        };
        return check_certificate(&cert, bytes, &signature);
    }

    for (id, cert) in store.certificates()? {
        if let Some(info) = check_certificate(&cert, bytes, &signature)? {
            debug!(identity = %id, "Detached signature matched local identity");
            return Ok(Some(info));
        }
    }
    Ok(None)
}

fn check_certificate(cert: &X509, bytes: &[u8], signature: &[u8]) -> Result<Option<SignerInfo>> {
    let key = cert.public_key()?;
    match pss_verify(&key, bytes, signature) {
        Ok(true) => SignerInfo::from_certificate(cert).map(Some),
        Ok(false) => Ok(None),
        Err(e) => {
            debug!(error = %e, "Verification raised");
            Ok(None)
        }
    }
}

fn decode_signature(sig_b64: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(sig_b64.trim())
        .map_err(|e| AegisError::SignatureInvalid(format!("signature encoding: {e}")))
}

fn pss_sign(key: &PKeyRef<Private>, data: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha256::digest(data);
    let mut signer = Signer::new(MessageDigest::sha256(), key)?;
    signer.set_rsa_padding(Padding::PKCS1_PSS)?;
    signer.set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)?;
    signer.set_rsa_mgf1_md(MessageDigest::sha256())?;
    signer.update(&digest)?;
    Ok(signer.sign_to_vec()?)
}

fn pss_verify<T: HasPublic>(key: &PKey<T>, data: &[u8], signature: &[u8]) -> Result<bool> {
    let digest = Sha256::digest(data);
    let mut verifier = Verifier::new(MessageDigest::sha256(), key)?;
    verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
    verifier.set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)?;
    verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
    verifier.update(&digest)?;
    Ok(verifier.verify(signature)?)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
