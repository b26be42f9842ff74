//! Seams for swappable backends: payload AEAD and token verification.

use crate::error::VaultError;

/// Authenticated encryption used for secret payloads.
///
/// Implementations must fail with [`VaultError::Authentication`] whenever the
/// tag does not verify, and must never hand back unauthenticated plaintext.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` under `key`, returning one self-contained blob.
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// Decrypt a blob previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, VaultError>;
}

/// Identity bound to a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
}

/// Verifies bearer tokens issued by the service side.
///
/// Implementations must map every verification failure to
/// [`VaultError::Unauthorized`] and every transport failure or timeout to
/// [`VaultError::Unavailable`]. Neither may be treated as success.
#[async_trait::async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Subject, VaultError>;
}
