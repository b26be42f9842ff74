//! AES-256-GCM implementation of the [`Cipher`] trait.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use aes_gcm::{
    AesGcm,
    aead::{AeadInPlace, KeyInit, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use rand::RngCore;

use crate::{error::VaultError, traits::Cipher};

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM payload cipher.
///
/// Blob layout: `[nonce: 16 bytes][tag: 16 bytes][ciphertext: N bytes]`.
/// No associated data is bound.
pub struct Aes256GcmCipher;

impl Cipher for Aes256GcmCipher {
    #[allow(deprecated)]
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let cipher = Aes256Gcm16::new(key.into());

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .map_err(|e| VaultError::Crypto(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);
        Ok(blob)
    }

    #[allow(deprecated)]
    fn decrypt(&self, key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, VaultError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Authentication);
        }

        let (nonce, rest) = blob.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        let cipher = Aes256Gcm16::new(key.into());

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| VaultError::Authentication)?;
        Ok(buffer)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [0x42u8; 32];
        let blob = Aes256GcmCipher.encrypt(&key, b"secret-1").unwrap();
        assert_eq!(blob.len(), NONCE_LEN + TAG_LEN + 8);
        assert_eq!(Aes256GcmCipher.decrypt(&key, &blob).unwrap(), b"secret-1");
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let key = [0x42u8; 32];
        let blob = Aes256GcmCipher.encrypt(&key, b"").unwrap();
        assert_eq!(blob.len(), NONCE_LEN + TAG_LEN);
        assert!(Aes256GcmCipher.decrypt(&key, &blob).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_fails() {
        let blob = Aes256GcmCipher.encrypt(&[0x42; 32], b"secret").unwrap();
        assert!(matches!(
            Aes256GcmCipher.decrypt(&[0x43; 32], &blob),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn every_bit_flip_in_tag_or_ciphertext_is_detected() {
        let key = [0x42u8; 32];
        let blob = Aes256GcmCipher.encrypt(&key, b"tamper me").unwrap();

        for byte in NONCE_LEN..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Aes256GcmCipher.decrypt(&key, &tampered),
                        Err(VaultError::Authentication)
                    ),
                    "flip at byte {byte} bit {bit} was not detected"
                );
            }
        }
    }

    #[test]
    fn too_short_blob_fails() {
        assert!(matches!(
            Aes256GcmCipher.decrypt(&[0x42; 32], &[0u8; 31]),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn different_nonces_produce_different_blobs() {
        let key = [0x42u8; 32];
        let a = Aes256GcmCipher.encrypt(&key, b"same").unwrap();
        let b = Aes256GcmCipher.encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);
    }
}
