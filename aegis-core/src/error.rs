use thiserror::Error;

#[derive(Error, Debug)]
pub enum AegisError {
    #[error("Unrecognized carrier format: {0}")]
    FormatUnrecognized(String),

    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Watermark engine failure: {0}")]
    EngineFailure(String),

    #[error("No watermark signal found in {0}")]
    NoSignalFound(String),

    #[error("No signature trailer present")]
    SignatureAbsent,

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("No signing identity available: {0}")]
    IdentityMissing(String),

    #[error("Invalid identity id {0:?}: use letters, digits, '-' or '_'")]
    InvalidIdentityId(String),

    #[error("No distribution record matches tracking id fragment {0:?}")]
    LedgerMiss(String),

    #[error("Tracking id already recorded: {0}")]
    DuplicateTrackingId(String),

    #[error("Distribution record #{0} already settled as {1}")]
    StatusSettled(i64, String),

    #[error("PDF renderer error: {0}")]
    Renderer(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

pub type Result<T> = std::result::Result<T, AegisError>;
