//! Vault facade: key changes with rotation, envelope sealing, gated unwraps.

use std::sync::Arc;

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    sqlx::SqlitePool,
    tokio::sync::RwLock,
    zeroize::Zeroizing,
};

use crate::{
    aes256gcm::Aes256GcmCipher,
    envelope::{self, EnvelopeCipher},
    envelopes::{EnvelopeRecord, EnvelopeStore},
    error::VaultError,
    key_wrap::KEY_LEN,
    master_keys::MasterKeyStore,
    root_key::RootKey,
    rotation::{RotationCoordinator, RotationReport},
    traits::{AuthorizationGate, Cipher, Subject},
};

/// Base64 blobs produced by sealing a payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SealedEnvelope {
    /// Payload ciphertext (`nonce || tag || ciphertext`).
    pub encrypted_key: String,
    /// DEK wrapped under the active master key.
    pub encrypted_dek: String,
}

/// Result of adding a master key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyChange {
    pub key_id: String,
    /// The key that was active before, if any.
    pub retired_key_id: Option<String>,
    /// Present when existing envelopes had to be migrated.
    pub rotation: Option<RotationReport>,
}

/// Envelope-encryption vault.
///
/// Key changes and rotations hold the key-change lock exclusively, so a
/// rotation never sees the active key change underneath it. Persisting
/// stores hold it shared: an envelope is either written before the rotation
/// lists its rows or wrapped under the new key.
pub struct Vault<C: Cipher = Aes256GcmCipher> {
    keys: MasterKeyStore,
    envelopes: EnvelopeStore,
    cipher: EnvelopeCipher<C>,
    gate: Arc<dyn AuthorizationGate>,
    key_change: RwLock<()>,
}

impl Vault<Aes256GcmCipher> {
    /// Create a vault with the default AES-256-GCM payload cipher.
    pub fn new(pool: SqlitePool, root: RootKey, gate: Arc<dyn AuthorizationGate>) -> Self {
        Self::with_cipher(pool, root, gate, Aes256GcmCipher)
    }
}

impl<C: Cipher> Vault<C> {
    /// Create a vault with a custom payload cipher.
    pub fn with_cipher(
        pool: SqlitePool,
        root: RootKey,
        gate: Arc<dyn AuthorizationGate>,
        cipher: C,
    ) -> Self {
        Self {
            keys: MasterKeyStore::new(pool.clone(), root),
            envelopes: EnvelopeStore::new(pool),
            cipher: EnvelopeCipher::new(cipher),
            gate,
            key_change: RwLock::new(()),
        }
    }

    pub fn keys(&self) -> &MasterKeyStore {
        &self.keys
    }

    pub fn envelopes(&self) -> &EnvelopeStore {
        &self.envelopes
    }

    /// Whether a master key has been added.
    pub async fn is_initialized(&self) -> Result<bool, VaultError> {
        match self.keys.get_active().await {
            Ok(_) => Ok(true),
            Err(VaultError::NoActiveKey) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make `material` the active master key (random when `None`) and migrate
    /// every stored envelope to it before returning.
    pub async fn add_master_key(
        &self,
        material: Option<&[u8; KEY_LEN]>,
        description: Option<&str>,
    ) -> Result<KeyChange, VaultError> {
        let _guard = self.key_change.write().await;

        let previous = match self.keys.get_active().await {
            Ok(key) => Some(key.key_id),
            Err(VaultError::NoActiveKey) => None,
            Err(e) => return Err(e),
        };

        let key_id = match material {
            Some(material) => self.keys.add(material, description).await?,
            None => self.keys.generate(description).await?,
        };

        let rotation = match previous {
            Some(_) => Some(self.rotator().run().await?),
            None => None,
        };

        Ok(KeyChange {
            key_id,
            retired_key_id: previous,
            rotation,
        })
    }

    /// Finish any interrupted rotation towards the current active key.
    pub async fn resume_rotation(&self) -> Result<RotationReport, VaultError> {
        let _guard = self.key_change.write().await;
        self.rotator().run().await
    }

    /// Encrypt `data` under the caller's `dek` and wrap the DEK under the
    /// active key. With an `owner_id` the envelope is also persisted.
    pub async fn encrypt(
        &self,
        data: &[u8],
        dek: &[u8; KEY_LEN],
        owner_id: Option<&str>,
    ) -> Result<SealedEnvelope, VaultError> {
        let _guard = match owner_id {
            Some(_) => Some(self.key_change.read().await),
            None => None,
        };
        let active = self.keys.get_active().await?;

        let sealed = SealedEnvelope {
            encrypted_key: BASE64.encode(self.cipher.encrypt_payload(data, dek)?),
            encrypted_dek: BASE64.encode(self.cipher.wrap_dek(dek, &active.material)),
        };

        if let Some(owner_id) = owner_id {
            self.envelopes
                .upsert(
                    owner_id,
                    &sealed.encrypted_key,
                    &sealed.encrypted_dek,
                    &active.key_id,
                )
                .await?;

            #[cfg(feature = "tracing")]
            tracing::debug!(owner_id, key_id = %active.key_id, "envelope stored");
        }

        Ok(sealed)
    }

    /// Store a secret for `owner_id` under a freshly generated DEK.
    ///
    /// Safe to retry: every attempt uses a new DEK and replaces the envelope.
    pub async fn store_secret(
        &self,
        owner_id: &str,
        plaintext: &[u8],
    ) -> Result<SealedEnvelope, VaultError> {
        if owner_id.trim().is_empty() {
            return Err(VaultError::Validation("owner_id is required".into()));
        }
        let dek = envelope::generate_dek();
        self.encrypt(plaintext, &dek, Some(owner_id)).await
    }

    /// Unwrap a stored DEK for the bearer of `token`.
    ///
    /// The token is verified and its subject must own the envelope holding
    /// `encrypted_dek` before any unwrap is attempted. An unknown blob is
    /// rejected the same way as a foreign one.
    pub async fn decrypt_dek(
        &self,
        token: Option<&str>,
        encrypted_dek: &str,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        let subject = self.authenticate(token).await?;

        let record = self
            .envelopes
            .find_by_wrapped_dek(encrypted_dek)
            .await?
            .ok_or_else(|| VaultError::Unauthorized("envelope not owned by subject".into()))?;
        ensure_owner(&subject, &record)?;

        self.unwrap_record_dek(&record).await
    }

    /// Decrypt the secret stored for `owner_id` on behalf of the bearer of `token`.
    pub async fn retrieve_secret(
        &self,
        token: Option<&str>,
        owner_id: &str,
    ) -> Result<Vec<u8>, VaultError> {
        let subject = self.authenticate(token).await?;
        if subject.id != owner_id {
            return Err(VaultError::Unauthorized(
                "envelope not owned by subject".into(),
            ));
        }

        let record = self
            .envelopes
            .get(owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("envelope for {owner_id}")))?;

        let dek = self.unwrap_record_dek(&record).await?;
        let payload = BASE64.decode(&record.encrypted_key)?;
        self.cipher.decrypt_payload(&payload, &dek)
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<Subject, VaultError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Unauthorized("missing token".into()))?;
        self.gate.verify(token).await
    }

    /// Unwrap under the active key, falling back to the key named by the
    /// record and then to retired keys while a rotation is pending.
    async fn unwrap_record_dek(
        &self,
        record: &EnvelopeRecord,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        let blob = BASE64.decode(&record.encrypted_dek)?;
        let active = self.keys.get_active().await?;

        let first_error = match self.cipher.unwrap_dek(&blob, &active.material) {
            Ok(dek) => return Ok(dek),
            Err(e) => e,
        };

        if let Some(key_id) = record.key_id.as_deref()
            && key_id != active.key_id
            && let Ok(key) = self.keys.get(key_id).await
            && let Ok(dek) = self.cipher.unwrap_dek(&blob, &key.material)
        {
            return Ok(dek);
        }

        for key in self.keys.readable_retired().await? {
            if let Ok(dek) = self.cipher.unwrap_dek(&blob, &key.material) {
                return Ok(dek);
            }
        }

        Err(first_error)
    }

    fn rotator(&self) -> RotationCoordinator<'_, C> {
        RotationCoordinator::new(&self.keys, &self.envelopes, &self.cipher)
    }
}

fn ensure_owner(subject: &Subject, record: &EnvelopeRecord) -> Result<(), VaultError> {
    if subject.id == record.owner_id {
        Ok(())
    } else {
        #[cfg(feature = "tracing")]
        tracing::warn!(subject = %subject.id, owner_id = %record.owner_id, "subject does not own envelope");
        Err(VaultError::Unauthorized(
            "envelope not owned by subject".into(),
        ))
    }
}
