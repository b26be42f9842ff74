//! Root key derivation and master key wrapping at rest.
//!
//! The root key is derived once per process from the operator secret with
//! SHA-256 and only ever lives in memory. It protects master key material in
//! the `master_keys` table and nothing else.

use {
    sha2::{Digest, Sha256},
    zeroize::Zeroizing,
};

use crate::{
    error::VaultError,
    key_wrap::{self, KEY_LEN},
};

/// 32-byte key derived from the operator-supplied root secret.
pub struct RootKey(Zeroizing<[u8; KEY_LEN]>);

impl RootKey {
    /// Derive the root key from an operator secret.
    pub fn derive(secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&digest);
        Self(key)
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey([REDACTED])")
    }
}

/// Wraps and unwraps master key material under the [`RootKey`].
#[derive(Debug)]
pub struct RootKeyWrapper {
    root: RootKey,
}

impl RootKeyWrapper {
    pub fn new(root: RootKey) -> Self {
        Self { root }
    }

    /// Wrap master key material. Non-deterministic (fresh IV per call).
    pub fn wrap(&self, material: &[u8; KEY_LEN]) -> Vec<u8> {
        key_wrap::wrap_key(&self.root.0, material)
    }

    /// Unwrap master key material.
    ///
    /// Any failure maps to [`VaultError::Unwrap`]: a wrong root secret and a
    /// tampered blob are indistinguishable here.
    pub fn unwrap(&self, blob: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        key_wrap::unwrap_key(&self.root.0, blob).map_err(|_e| {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %_e, "root key unwrap rejected blob");
            VaultError::Unwrap
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = RootKey::derive(b"operator secret");
        let b = RootKey::derive(b"operator secret");
        assert_eq!(*a.0, *b.0);
        assert_ne!(*a.0, *RootKey::derive(b"other secret").0);
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let wrapper = RootKeyWrapper::new(RootKey::derive(b"root"));
        let material = [0x5A; 32];
        let blob = wrapper.wrap(&material);
        assert_eq!(*wrapper.unwrap(&blob).unwrap(), material);
    }

    #[test]
    fn wrong_root_secret_fails_closed() {
        let blob = RootKeyWrapper::new(RootKey::derive(b"right")).wrap(&[0x5A; 32]);
        let other = RootKeyWrapper::new(RootKey::derive(b"wrong"));
        assert!(matches!(other.unwrap(&blob), Err(VaultError::Unwrap)));
    }

    #[test]
    fn wrong_length_fails_closed() {
        let wrapper = RootKeyWrapper::new(RootKey::derive(b"root"));
        assert!(matches!(wrapper.unwrap(&[0u8; 20]), Err(VaultError::Unwrap)));
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", RootKey::derive(b"root"));
        assert_eq!(rendered, "RootKey([REDACTED])");
    }
}
