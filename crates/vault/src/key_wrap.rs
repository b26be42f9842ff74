//! AES-256-CBC key wrapping with PKCS#7 padding.
//!
//! Used both for master key material under the root key and for DEKs under a
//! master key. Each wrap draws a fresh random IV, so wrapping the same key
//! twice never yields the same blob.
//!
//! Blob layout: `[iv: 16 bytes][ciphertext: 48 bytes]`. A 32-byte key is
//! block-aligned, so PKCS#7 always appends one full padding block.

use {
    cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7},
    rand::RngCore,
    zeroize::Zeroizing,
};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of every key handled by the vault (root, master, data).
pub const KEY_LEN: usize = 32;

/// CBC initialization vector length.
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Exact length of a wrapped 32-byte key.
pub const WRAPPED_LEN: usize = IV_LEN + KEY_LEN + BLOCK_LEN;

/// Reasons a wrapped blob is rejected. Callers map these into the
/// appropriate [`VaultError`](crate::VaultError) variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WrapError {
    #[error("wrapped key has invalid length {0}")]
    Length(usize),
    #[error("invalid padding")]
    Padding,
    #[error("unwrapped key has wrong length {0} (expected {KEY_LEN})")]
    KeyLength(usize),
}

/// Wrap `key` under `kek`, returning `iv || ciphertext`.
pub fn wrap_key(kek: &[u8; KEY_LEN], key: &[u8; KEY_LEN]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(kek.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(key);

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    blob
}

/// Unwrap a blob produced by [`wrap_key`].
///
/// Fails closed: no bytes are returned unless the padding is valid and the
/// recovered key is exactly [`KEY_LEN`] bytes.
pub fn unwrap_key(kek: &[u8; KEY_LEN], blob: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, WrapError> {
    if blob.len() <= IV_LEN || (blob.len() - IV_LEN) % BLOCK_LEN != 0 {
        return Err(WrapError::Length(blob.len()));
    }

    let (iv, ciphertext) = blob.split_at(IV_LEN);
    let decryptor =
        Aes256CbcDec::new_from_slices(kek, iv).map_err(|_| WrapError::Length(blob.len()))?;
    let plaintext = Zeroizing::new(
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| WrapError::Padding)?,
    );

    if plaintext.len() != KEY_LEN {
        return Err(WrapError::KeyLength(plaintext.len()));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&plaintext);
    Ok(key)
}
