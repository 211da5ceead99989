//! MediaVault - Password Rotation
//!
//! Crash-safe change of the vault password across every container and the
//! wrapped database key. The journal record is flushed before each step it
//! announces; recovery after a crash is re-running the protocol with the
//! same password pair, which converges because derivation is deterministic
//! and per-file rewrap is idempotent.
//!
//! Protocol: verify old password -> write journal -> derive new key ->
//! rewrap all containers -> rewrap database key -> finalize -> commit
//! (replace canary; from here only the new password unlocks) -> clear
//! journal.

use chrono::Utc;
use walkdir::WalkDir;
use zeroize::Zeroizing;

use crate::codec::{self, RewrapOutcome, VAULT_EXT};
use crate::crypto::{
    derive_database_key, derive_master_key, open_blob, seal_blob, MasterKey, NONCE_LEN,
};
use crate::error::{VaultError, VaultResult};
use crate::journal::{JournalRecord, RotationState, RotationStep, SealedBlob};
use crate::keystore::ids;
use crate::session::VaultSession;

impl VaultSession {
    /// Change the vault password without re-encrypting bulk data.
    ///
    /// Mutually exclusive: a second invocation while a rotation is running
    /// fails fast with [`VaultError::RotationInProgress`] and mutates
    /// nothing. There is no cancellation once started; the protocol runs
    /// to completion, to `Failed`, or to process death (handled by journal
    /// inspection on the next startup).
    pub fn change_password_safely(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> VaultResult<()> {
        self.rotate(old_password, new_password, false)
    }

    /// Re-run an interrupted or failed rotation with the same password
    /// pair. This is the manual recovery path required once the journal is
    /// found at `InProgress` or `Failed`.
    pub fn recover_rotation(&self, old_password: &str, new_password: &str) -> VaultResult<()> {
        self.rotate(old_password, new_password, true)
    }

    fn rotate(&self, old_password: &str, new_password: &str, recovering: bool) -> VaultResult<()> {
        let _gate = self
            .rotation_gate
            .try_lock()
            .ok_or(VaultError::RotationInProgress)?;

        match (self.journal().state()?, recovering) {
            (RotationState::Idle, _) => {}
            (_, true) => {}
            (RotationState::InProgress, false) => return Err(VaultError::RotationInProgress),
            (RotationState::Failed, false) => {
                return Err(VaultError::RotationFailed(
                    "previous rotation failed, run recovery".into(),
                ))
            }
        }

        let phrase = self.load_phrase()?;
        let argon2 = self.argon2();

        // Step 1: verify the old password. The phrase never changes, so
        // both keys derive deterministically from their passwords.
        let old_key = derive_master_key(old_password, &phrase, &argon2)?;
        let new_key = derive_master_key(new_password, &phrase, &argon2)?;

        // After the commit point the canary already sits on the new key; a
        // recovery re-run must accept either side of it.
        let old_matches = self.canary_matches(&old_key)?;
        if !old_matches && !self.canary_matches(&new_key)? {
            return Err(VaultError::AuthenticationFailed);
        }

        // Step 2: write-ahead record, durable before any mutation begins.
        let mut record = JournalRecord {
            state: RotationState::InProgress,
            step: Some(RotationStep::RewrapFiles),
            old_key_id: Some(old_key.key_id()),
            new_key_id: None,
            encrypted_db_key_backup: None,
            updated_at: Utc::now(),
        };
        self.journal().write(&record)?;

        // Step 3: record the target key id.
        record.new_key_id = Some(new_key.key_id());
        record.updated_at = Utc::now();
        self.journal().write(&record)?;

        // Step 4: rewrap every container. A single failure fails the whole
        // rotation; silently skipping a file would leave it on the old key
        // while the vault reports success.
        match self.rewrap_all_files(&old_key, &new_key) {
            Ok((rewrapped, already)) => {
                log::info!("rotation rewrapped {rewrapped} containers, {already} already current");
            }
            Err(e) => return self.fail_rotation(record, e),
        }

        // Step 5: rewrap the persisted database key. O(1): the database
        // itself is never re-encrypted.
        record.step = Some(RotationStep::RewrapDatabaseKey);
        record.updated_at = Utc::now();
        self.journal().write(&record)?;
        if let Err(e) = self.rewrap_database_key(&old_key, &new_key, &mut record) {
            return self.fail_rotation(record, e);
        }

        // Step 6: finalize. Clear the session slot so no reference derived
        // from the old master key remains cached; the external database
        // engine re-requests its key through the consumer surface.
        record.step = Some(RotationStep::Finalize);
        record.updated_at = Utc::now();
        self.journal().write(&record)?;
        self.lock();

        // Step 7: commit point. Replacing the canary is the single
        // irreversible action: before it the old password still unlocks,
        // after it only the new one does.
        self.write_canary(&new_key)?;
        if self.keystore().load(ids::BIOMETRIC_MASTER)?.is_some() {
            self.keystore().store(ids::BIOMETRIC_MASTER, new_key.expose())?;
        }

        // Step 8: back to idle.
        self.journal().clear()?;
        self.install_active(new_key);
        log::info!("password rotation complete");
        Ok(())
    }

    fn fail_rotation(&self, mut record: JournalRecord, cause: VaultError) -> VaultResult<()> {
        log::error!("rotation failed at {:?}: {cause}", record.step);
        record.state = RotationState::Failed;
        record.updated_at = Utc::now();
        self.journal().write(&record)?;
        Err(VaultError::RotationFailed(cause.to_string()))
    }

    fn rewrap_all_files(&self, old: &MasterKey, new: &MasterKey) -> VaultResult<(u32, u32)> {
        let media = self.media_dir();
        if !media.exists() {
            return Ok((0, 0));
        }

        let mut rewrapped = 0u32;
        let mut already = 0u32;

        for entry in WalkDir::new(&media) {
            let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VAULT_EXT) {
                continue;
            }

            // Trying the new key first makes a retried rotation a no-op
            // for containers migrated before the crash.
            match codec::rewrap_header(path, old, new) {
                Ok(RewrapOutcome::Rewrapped) => rewrapped += 1,
                Ok(RewrapOutcome::AlreadyCurrent) => already += 1,
                Err(e) => {
                    log::error!("rewrap failed for {}: {e}", path.display());
                    return Err(e);
                }
            }
        }

        Ok((rewrapped, already))
    }

    fn rewrap_database_key(
        &self,
        old: &MasterKey,
        new: &MasterKey,
        record: &mut JournalRecord,
    ) -> VaultResult<()> {
        let plain: Zeroizing<Vec<u8>> = match self.keystore().load(ids::DATABASE_KEY)? {
            Some(blob) => match open_blob(new, &blob) {
                // Already re-wrapped by an interrupted earlier attempt.
                Ok(_) => return Ok(()),
                Err(VaultError::AuthenticationFailed) => open_blob(old, &blob)?,
                Err(e) => return Err(e),
            },
            // Vaults that never materialized the wrapped copy: the key is
            // still the HKDF derivation from the outgoing master key.
            None => Zeroizing::new(derive_database_key(old).to_vec()),
        };

        let sealed = seal_blob(new, &plain)?;

        // Durable backup in the journal until the keystore copy lands.
        record.encrypted_db_key_backup = Some(SealedBlob {
            iv: hex::encode(&sealed[..NONCE_LEN]),
            data: hex::encode(&sealed[NONCE_LEN..]),
        });
        record.updated_at = Utc::now();
        self.journal().write(record)?;

        self.keystore().store(ids::DATABASE_KEY, &sealed)?;
        Ok(())
    }
}
