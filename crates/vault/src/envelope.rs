//! Envelope encryption: payloads under a per-secret DEK, DEKs under a master key.

use {rand::RngCore, zeroize::Zeroizing};

use crate::{
    aes256gcm::Aes256GcmCipher,
    error::VaultError,
    key_wrap::{self, KEY_LEN},
    traits::Cipher,
};

/// Generate a fresh random 32-byte DEK. Every stored secret gets its own.
pub fn generate_dek() -> Zeroizing<[u8; KEY_LEN]> {
    let mut dek = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(dek.as_mut());
    dek
}

/// Payload encryption plus DEK wrapping.
///
/// Generic over the payload [`Cipher`]; DEK wrapping always uses the CBC
/// scheme from [`key_wrap`] with its own random IV.
pub struct EnvelopeCipher<C: Cipher = Aes256GcmCipher> {
    cipher: C,
}

impl Default for EnvelopeCipher<Aes256GcmCipher> {
    fn default() -> Self {
        Self::new(Aes256GcmCipher)
    }
}

impl<C: Cipher> EnvelopeCipher<C> {
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    /// Encrypt a payload under `dek`. The caller guarantees the DEK is fresh.
    pub fn encrypt_payload(
        &self,
        plaintext: &[u8],
        dek: &[u8; KEY_LEN],
    ) -> Result<Vec<u8>, VaultError> {
        self.cipher.encrypt(dek, plaintext)
    }

    /// Decrypt a payload. Fails with [`VaultError::Authentication`] on any tamper.
    pub fn decrypt_payload(&self, blob: &[u8], dek: &[u8; KEY_LEN]) -> Result<Vec<u8>, VaultError> {
        self.cipher.decrypt(dek, blob)
    }

    /// Wrap a DEK under master key material.
    pub fn wrap_dek(&self, dek: &[u8; KEY_LEN], master: &[u8; KEY_LEN]) -> Vec<u8> {
        key_wrap::wrap_key(master, dek)
    }

    /// Unwrap a DEK. Fails with [`VaultError::Crypto`] on padding or length errors.
    pub fn unwrap_dek(
        &self,
        blob: &[u8],
        master: &[u8; KEY_LEN],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        key_wrap::unwrap_key(master, blob).map_err(|e| VaultError::Crypto(e.to_string()))
    }
}
