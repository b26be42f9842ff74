//! Re-wrapping stored DEKs after a master key change.
//!
//! Each envelope is migrated on its own: a corrupted row is recorded and
//! skipped, never aborting the batch. A retired master key record that no
//! longer unwraps is left out of the candidate keys, so only the rows that
//! needed it fail. Only failing to enumerate the rows is fatal.
//!
//! The run is safe to repeat. A row whose `key_id` already names the target
//! key is skipped outright; a row that unwraps under the target key is
//! treated as migrated and only has its marker fixed. Neither is re-wrapped.

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    zeroize::Zeroizing,
};

use crate::{
    envelope::EnvelopeCipher,
    envelopes::{EnvelopeRecord, EnvelopeStore},
    error::VaultError,
    key_wrap::KEY_LEN,
    master_keys::{MasterKey, MasterKeyStore},
    traits::Cipher,
};

/// A row that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RotationFailure {
    pub owner_id: String,
    pub reason: String,
}

/// Outcome of one rotation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RotationReport {
    /// Key id every envelope was migrated towards.
    pub target_key_id: String,
    /// Rows re-wrapped by this run.
    pub migrated: usize,
    /// Rows already wrapped under the target key.
    pub already_current: usize,
    pub failed: Vec<RotationFailure>,
}

impl RotationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// How often a row that keeps changing underneath a migration is re-read.
const MAX_ROW_ATTEMPTS: usize = 3;

enum RowOutcome {
    Migrated,
    AlreadyCurrent,
}

/// Migrates every envelope to the active master key.
///
/// Callers must hold the vault's key-change lock for the whole run so the
/// target key cannot change mid-batch.
pub struct RotationCoordinator<'a, C: Cipher> {
    keys: &'a MasterKeyStore,
    envelopes: &'a EnvelopeStore,
    cipher: &'a EnvelopeCipher<C>,
}

impl<'a, C: Cipher> RotationCoordinator<'a, C> {
    pub fn new(
        keys: &'a MasterKeyStore,
        envelopes: &'a EnvelopeStore,
        cipher: &'a EnvelopeCipher<C>,
    ) -> Self {
        Self {
            keys,
            envelopes,
            cipher,
        }
    }

    /// Re-wrap every envelope under the current active key.
    pub async fn run(&self) -> Result<RotationReport, VaultError> {
        let target = self.keys.get_active().await?;
        let retired = self.keys.readable_retired().await?;
        let rows = self.envelopes.list().await?;

        let mut report = RotationReport {
            target_key_id: target.key_id.clone(),
            ..RotationReport::default()
        };

        for row in rows {
            if row.key_id.as_deref() == Some(target.key_id.as_str()) {
                report.already_current += 1;
                continue;
            }

            match self.migrate_row(row.clone(), &target, &retired).await {
                Ok(RowOutcome::Migrated) => report.migrated += 1,
                Ok(RowOutcome::AlreadyCurrent) => report.already_current += 1,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(owner_id = %row.owner_id, error = %e, "envelope rotation failed, skipping row");
                    report.failed.push(RotationFailure {
                        owner_id: row.owner_id,
                        reason: e.to_string(),
                    });
                },
            }
        }

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("custodian_rotation_rows_total", "outcome" => "migrated")
                .increment(report.migrated as u64);
            metrics::counter!("custodian_rotation_rows_total", "outcome" => "already_current")
                .increment(report.already_current as u64);
            metrics::counter!("custodian_rotation_rows_total", "outcome" => "failed")
                .increment(report.failed.len() as u64);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            target_key_id = %report.target_key_id,
            migrated = report.migrated,
            already_current = report.already_current,
            failed = report.failed.len(),
            "rotation finished"
        );

        Ok(report)
    }

    async fn migrate_row(
        &self,
        mut row: EnvelopeRecord,
        target: &MasterKey,
        retired: &[MasterKey],
    ) -> Result<RowOutcome, VaultError> {
        for _ in 0..MAX_ROW_ATTEMPTS {
            if row.key_id.as_deref() == Some(target.key_id.as_str()) {
                return Ok(RowOutcome::AlreadyCurrent);
            }
            if let Some(outcome) = self.try_migrate_row(&row, target, retired).await? {
                return Ok(outcome);
            }

            // Rewritten since it was listed. The new blob may still be under
            // an older key, so look again.
            match self.envelopes.get(&row.owner_id).await? {
                Some(current) => row = current,
                None => return Ok(RowOutcome::AlreadyCurrent),
            }
        }

        Err(VaultError::Crypto(format!(
            "envelope changed {MAX_ROW_ATTEMPTS} times during rotation"
        )))
    }

    /// `None` when the row no longer holds the blob it was read with.
    async fn try_migrate_row(
        &self,
        row: &EnvelopeRecord,
        target: &MasterKey,
        retired: &[MasterKey],
    ) -> Result<Option<RowOutcome>, VaultError> {
        let blob = BASE64.decode(&row.encrypted_dek)?;

        if self.cipher.unwrap_dek(&blob, &target.material).is_ok() {
            self.envelopes
                .set_key_id(&row.owner_id, &target.key_id)
                .await?;
            return Ok(Some(RowOutcome::AlreadyCurrent));
        }

        let dek = self.unwrap_from_sources(row, &blob, retired)?;
        let rewrapped = BASE64.encode(self.cipher.wrap_dek(&dek, &target.material));

        let replaced = self
            .envelopes
            .replace_wrapped_dek(&row.owner_id, &row.encrypted_dek, &rewrapped, &target.key_id)
            .await?;
        Ok(replaced.then_some(RowOutcome::Migrated))
    }

    /// Try the key named by the row's marker first, then every retired key
    /// newest first.
    fn unwrap_from_sources(
        &self,
        row: &EnvelopeRecord,
        blob: &[u8],
        retired: &[MasterKey],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        let marked = row
            .key_id
            .as_deref()
            .and_then(|id| retired.iter().find(|k| k.key_id == id));
        let candidates = marked
            .into_iter()
            .chain(retired.iter().filter(|k| Some(k.key_id.as_str()) != row.key_id.as_deref()));

        let mut last_error = None;
        for key in candidates {
            match self.cipher.unwrap_dek(blob, &key.material) {
                Ok(dek) => return Ok(dek),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VaultError::Crypto("no retired master key to unwrap from".to_string())
        }))
    }
}
