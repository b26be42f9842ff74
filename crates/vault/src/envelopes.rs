//! Persisted DEK envelopes, one per owner.

use sqlx::SqlitePool;

use crate::error::VaultError;

/// Row from the `dek_envelopes` table. Blobs are base64.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EnvelopeRecord {
    pub owner_id: String,
    pub encrypted_key: String,
    pub encrypted_dek: String,
    /// Master key currently wrapping `encrypted_dek`, when known.
    pub key_id: Option<String>,
    pub created_at: String,
}

const SELECT_COLUMNS: &str = "SELECT owner_id, encrypted_key, encrypted_dek, key_id, created_at FROM dek_envelopes";

/// SQLite-backed envelope storage.
#[derive(Clone)]
pub struct EnvelopeStore {
    pool: SqlitePool,
}

impl EnvelopeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the envelope for `owner_id`.
    pub async fn upsert(
        &self,
        owner_id: &str,
        encrypted_key: &str,
        encrypted_dek: &str,
        key_id: &str,
    ) -> Result<(), VaultError> {
        sqlx::query(
            "INSERT INTO dek_envelopes (owner_id, encrypted_key, encrypted_dek, key_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(owner_id) DO UPDATE SET
                encrypted_key = excluded.encrypted_key,
                encrypted_dek = excluded.encrypted_dek,
                key_id        = excluded.key_id,
                updated_at    = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(owner_id)
        .bind(encrypted_key)
        .bind(encrypted_dek)
        .bind(key_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, owner_id: &str) -> Result<Option<EnvelopeRecord>, VaultError> {
        Ok(
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE owner_id = ?"))
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Look up the envelope holding exactly this wrapped DEK.
    pub async fn find_by_wrapped_dek(
        &self,
        encrypted_dek: &str,
    ) -> Result<Option<EnvelopeRecord>, VaultError> {
        Ok(
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE encrypted_dek = ?"))
                .bind(encrypted_dek)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Every envelope, oldest first.
    pub async fn list(&self) -> Result<Vec<EnvelopeRecord>, VaultError> {
        Ok(sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?)
    }

    /// Swap the wrapped DEK of one envelope, but only if it still holds
    /// `expected`. Returns `false` when the row changed underneath us.
    ///
    /// `encrypted_key` is never touched.
    pub async fn replace_wrapped_dek(
        &self,
        owner_id: &str,
        expected: &str,
        encrypted_dek: &str,
        key_id: &str,
    ) -> Result<bool, VaultError> {
        let result = sqlx::query(
            "UPDATE dek_envelopes
             SET encrypted_dek = ?, key_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE owner_id = ? AND encrypted_dek = ?",
        )
        .bind(encrypted_dek)
        .bind(key_id)
        .bind(owner_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record which master key wraps an envelope without changing its blobs.
    pub async fn set_key_id(&self, owner_id: &str, key_id: &str) -> Result<(), VaultError> {
        sqlx::query("UPDATE dek_envelopes SET key_id = ? WHERE owner_id = ?")
            .bind(key_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
