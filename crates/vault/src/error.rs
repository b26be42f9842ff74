//! Vault error types.

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A request field is missing or malformed. Nothing was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Missing or rejected token, or the token subject does not own the envelope.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The authorization service could not be reached in time.
    #[error("authorization service unavailable: {0}")]
    Unavailable(String),

    /// No master key has been added yet.
    #[error("no active master key")]
    NoActiveKey,

    /// A named resource (master key, envelope) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Key wrapping failed (bad padding, wrong length, wrong key).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Payload tag verification failed (tampered data or wrong DEK).
    #[error("payload authentication failed")]
    Authentication,

    /// Master key material could not be unwrapped with the root key.
    #[error("root key unwrap failed")]
    Unwrap,

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Database error.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
