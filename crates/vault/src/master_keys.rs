//! Master key lineage: root-key-wrapped records with an active/retired status.
//!
//! Adding a key inserts a new active record and retires the previous one in a
//! single transaction. Retired records are kept forever; rotation and
//! historical unwraps still need them.

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    rand::RngCore,
    sqlx::SqlitePool,
    tokio::sync::RwLock,
    zeroize::Zeroizing,
};

use crate::{
    error::VaultError,
    key_wrap::KEY_LEN,
    root_key::{RootKey, RootKeyWrapper},
};

/// Lifecycle state of a master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Retired,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }

    fn parse(raw: &str) -> Result<Self, VaultError> {
        match raw {
            "active" => Ok(Self::Active),
            "retired" => Ok(Self::Retired),
            other => Err(VaultError::Storage(sqlx::Error::Decode(
                format!("unknown master key status: {other}").into(),
            ))),
        }
    }
}

/// An unwrapped master key. Material is zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    pub key_id: String,
    pub material: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key_id", &self.key_id)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Audit view of a master key record. Never carries material.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MasterKeyInfo {
    pub key_id: String,
    pub created_at: String,
    pub status: KeyStatus,
    pub description: Option<String>,
}

/// SQLite-backed master key store.
///
/// The unwrapped active key is cached, but every lookup first reads the
/// active `key_id` from the database. Another instance sharing the database
/// may change keys at any time; a cached key that is no longer active is
/// dropped and reloaded.
pub struct MasterKeyStore {
    pool: SqlitePool,
    wrapper: RootKeyWrapper,
    active: RwLock<Option<MasterKey>>,
}

impl MasterKeyStore {
    pub fn new(pool: SqlitePool, root: RootKey) -> Self {
        Self {
            pool,
            wrapper: RootKeyWrapper::new(root),
            active: RwLock::new(None),
        }
    }

    /// Add `material` as the new active key and retire the previous one.
    ///
    /// Both writes share one transaction, so a failure leaves the previous
    /// active key untouched.
    pub async fn add(
        &self,
        material: &[u8; KEY_LEN],
        description: Option<&str>,
    ) -> Result<String, VaultError> {
        let key_id = uuid::Uuid::new_v4().to_string();
        let wrapped = BASE64.encode(self.wrapper.wrap(material));

        let mut cache = self.active.write().await;
        let mut tx = self.pool.begin().await?;

        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let retired = sqlx::query("UPDATE master_keys SET status = 'retired' WHERE status = 'active'")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "INSERT INTO master_keys (key_id, key_material, status, description)
             VALUES (?, ?, 'active', ?)",
        )
        .bind(&key_id)
        .bind(&wrapped)
        .bind(description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        *cache = None;
        drop(cache);

        #[cfg(feature = "tracing")]
        tracing::info!(key_id = %key_id, retired, "master key added");

        #[cfg(feature = "metrics")]
        metrics::counter!("custodian_master_keys_added_total").increment(1);

        Ok(key_id)
    }

    /// Generate random material and [`add`](Self::add) it.
    pub async fn generate(&self, description: Option<&str>) -> Result<String, VaultError> {
        let mut material = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(material.as_mut());
        self.add(&material, description).await
    }

    /// The current active key, unwrapped.
    ///
    /// Fails with [`VaultError::NoActiveKey`] on an uninitialized vault.
    pub async fn get_active(&self) -> Result<MasterKey, VaultError> {
        let current: Option<(String,)> = sqlx::query_as(
            "SELECT key_id FROM master_keys
             WHERE status = 'active' ORDER BY seq DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some((current_id,)) = current else {
            *self.active.write().await = None;
            return Err(VaultError::NoActiveKey);
        };

        if let Some(key) = self.active.read().await.as_ref()
            && key.key_id == current_id
        {
            return Ok(key.clone());
        }

        let mut cache = self.active.write().await;
        if let Some(key) = cache.as_ref()
            && key.key_id == current_id
        {
            return Ok(key.clone());
        }

        #[cfg(feature = "tracing")]
        if let Some(stale) = cache.as_ref() {
            tracing::info!(stale = %stale.key_id, active = %current_id, "active master key changed, reloading");
        }

        let key = self.get(&current_id).await?;
        *cache = Some(key.clone());
        Ok(key)
    }

    /// A single key by id, whatever its status.
    pub async fn get(&self, key_id: &str) -> Result<MasterKey, VaultError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT key_id, key_material FROM master_keys WHERE key_id = ?")
                .bind(key_id)
                .fetch_optional(&self.pool)
                .await?;

        let (key_id, wrapped) =
            row.ok_or_else(|| VaultError::NotFound(format!("master key {key_id}")))?;
        self.unwrap_record(key_id, &wrapped)
    }

    /// All retired keys, unwrapped, newest first.
    pub async fn get_retired(&self) -> Result<Vec<MasterKey>, VaultError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key_id, key_material FROM master_keys
             WHERE status = 'retired' ORDER BY seq DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(key_id, wrapped)| self.unwrap_record(key_id, &wrapped))
            .collect()
    }

    /// Retired keys that unwrap under the root key, newest first.
    ///
    /// A record that fails to unwrap is logged and left out. Envelopes that
    /// needed it then fail on their own instead of taking every other
    /// envelope down with them.
    pub async fn readable_retired(&self) -> Result<Vec<MasterKey>, VaultError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key_id, key_material FROM master_keys
             WHERE status = 'retired' ORDER BY seq DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for (key_id, wrapped) in rows {
            match self.unwrap_record(key_id.clone(), &wrapped) {
                Ok(key) => keys.push(key),
                #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(key_id = %key_id, error = %e, "skipping unreadable retired master key");
                },
            }
        }
        Ok(keys)
    }

    /// Metadata for every key, newest first.
    pub async fn list(&self) -> Result<Vec<MasterKeyInfo>, VaultError> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT key_id, created_at, status, description FROM master_keys ORDER BY seq DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(key_id, created_at, status, description)| {
                Ok(MasterKeyInfo {
                    key_id,
                    created_at,
                    status: KeyStatus::parse(&status)?,
                    description,
                })
            })
            .collect()
    }

    fn unwrap_record(&self, key_id: String, wrapped_b64: &str) -> Result<MasterKey, VaultError> {
        let blob = BASE64.decode(wrapped_b64)?;
        let material = self.wrapper.unwrap(&blob)?;
        Ok(MasterKey { key_id, material })
    }
}
