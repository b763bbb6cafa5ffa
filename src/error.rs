//! Error taxonomy shared by the callback and messaging paths.

use thiserror::Error;

/// Failures surfaced by the core.
///
/// None of these are swallowed inside the crate. The webhook portal maps
/// them to generic rejection bodies, and the send API folds them into a
/// failed [`MessageResult`](crate::message::MessageResult).
#[derive(Debug, Error, PartialEq)]
pub enum NoticeError {
    /// Presented signature does not match the computed digest.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Malformed ciphertext, bad key, bad length prefix or truncated envelope.
    #[error("decrypt error: {0}")]
    Decrypt(String),

    /// Envelope decrypted but is bound to a different tenant.
    #[error("tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    /// Remote authentication (gettoken) failed.
    #[error("credential fetch failed: {0}")]
    CredentialFetch(String),

    /// Missing or blank required configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Outbound send could not reach the platform or read its reply.
    #[error("send failed: {0}")]
    Transport(String),
}

pub type NoticeResult<T> = Result<T, NoticeError>;
