//! Envelope-encryption vault with a rotating master key lineage.
//!
//! Each secret is encrypted under its own random DEK (AES-256-GCM). DEKs are
//! wrapped under the active master key (AES-256-CBC), and master keys are
//! wrapped at rest under a root key derived from the operator secret. Adding
//! a master key retires the previous one and re-wraps every stored DEK.
//! Unwrapping a DEK requires a verified token whose subject owns the envelope.

pub mod aes256gcm;
pub mod envelope;
pub mod envelopes;
pub mod error;
pub mod key_wrap;
pub mod master_keys;
pub mod root_key;
pub mod rotation;
pub mod traits;
pub mod vault;

pub use {
    aes256gcm::Aes256GcmCipher,
    envelope::{EnvelopeCipher, generate_dek},
    envelopes::{EnvelopeRecord, EnvelopeStore},
    error::VaultError,
    master_keys::{KeyStatus, MasterKey, MasterKeyInfo, MasterKeyStore},
    root_key::{RootKey, RootKeyWrapper},
    rotation::{RotationCoordinator, RotationFailure, RotationReport},
    traits::{AuthorizationGate, Cipher, Subject},
    vault::{KeyChange, SealedEnvelope, Vault},
};

/// Run database migrations for the vault crate.
///
/// Creates the `master_keys` and `dek_envelopes` tables. Call once at startup
/// before constructing a [`Vault`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
