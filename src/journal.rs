//! MediaVault - Rotation Journal
//!
//! Durable write-ahead record of an in-progress password rotation. The
//! record is flushed to disk before any mutation it announces, which is
//! the entire basis of crash safety: a journal found at `InProgress` on
//! startup means the rotation died mid-flight and unlock must be routed
//! through manual recovery.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Journal file name inside the vault root
const JOURNAL_FILE: &str = "rotation.journal";

/// Rotation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationState {
    Idle,
    InProgress,
    Failed,
}

/// Step the rotation protocol is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationStep {
    RewrapFiles,
    RewrapDatabaseKey,
    Finalize,
}

/// A sealed blob persisted inside the journal record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBlob {
    /// Hex-encoded AEAD IV
    pub iv: String,
    /// Hex-encoded ciphertext with tag
    pub data: String,
}

/// Persisted journal record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub state: RotationState,
    pub step: Option<RotationStep>,
    pub old_key_id: Option<String>,
    pub new_key_id: Option<String>,
    /// Database key re-wrapped under the new master key, kept here until
    /// the keystore copy is committed
    pub encrypted_db_key_backup: Option<SealedBlob>,
    pub updated_at: DateTime<Utc>,
}

impl JournalRecord {
    /// Fresh idle record
    pub fn idle() -> Self {
        Self {
            state: RotationState::Idle,
            step: None,
            old_key_id: None,
            new_key_id: None,
            encrypted_db_key_backup: None,
            updated_at: Utc::now(),
        }
    }
}

/// Durable file-backed journal store
pub struct RotationJournal {
    path: PathBuf,
}

impl RotationJournal {
    pub fn new(vault_root: &Path) -> Self {
        Self {
            path: vault_root.join(JOURNAL_FILE),
        }
    }

    /// Read the current record; absent file means idle
    pub fn read(&self) -> VaultResult<JournalRecord> {
        if !self.path.exists() {
            return Ok(JournalRecord::idle());
        }
        let data = fs::read(&self.path)?;
        serde_json::from_slice(&data)
            .map_err(|e| VaultError::Serialization(format!("journal record: {e}")))
    }

    /// Current rotation state
    pub fn state(&self) -> VaultResult<RotationState> {
        Ok(self.read()?.state)
    }

    /// Durably persist a record.
    ///
    /// The record is written to a temp file, fsynced, renamed over the
    /// journal, and the directory entry is fsynced too. Buffered or
    /// best-effort writes here would break the write-ahead guarantee.
    pub fn write(&self, record: &JournalRecord) -> VaultResult<()> {
        let data = serde_json::to_vec_pretty(record)?;
        let tmp = self.path.with_extension("journal.tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)?;
        Ok(())
    }

    /// Clear the journal back to idle
    pub fn clear(&self) -> VaultResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                sync_parent_dir(&self.path)?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sync_parent_dir(path: &Path) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_absent_journal_reads_idle() {
        let dir = tempdir().unwrap();
        let journal = RotationJournal::new(dir.path());

        let record = journal.read().unwrap();
        assert_eq!(record.state, RotationState::Idle);
        assert!(record.step.is_none());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let journal = RotationJournal::new(dir.path());

        let mut record = JournalRecord::idle();
        record.state = RotationState::InProgress;
        record.step = Some(RotationStep::RewrapFiles);
        record.old_key_id = Some("0011223344556677".into());
        journal.write(&record).unwrap();

        let read_back = journal.read().unwrap();
        assert_eq!(read_back.state, RotationState::InProgress);
        assert_eq!(read_back.step, Some(RotationStep::RewrapFiles));
        assert_eq!(read_back.old_key_id.as_deref(), Some("0011223344556677"));
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let dir = tempdir().unwrap();
        let journal = RotationJournal::new(dir.path());

        let mut record = JournalRecord::idle();
        record.state = RotationState::Failed;
        journal.write(&record).unwrap();
        assert_eq!(journal.state().unwrap(), RotationState::Failed);

        journal.clear().unwrap();
        assert_eq!(journal.state().unwrap(), RotationState::Idle);

        // Clearing twice is fine
        journal.clear().unwrap();
    }

    #[test]
    fn test_backup_blob_roundtrip() {
        let dir = tempdir().unwrap();
        let journal = RotationJournal::new(dir.path());

        let mut record = JournalRecord::idle();
        record.state = RotationState::InProgress;
        record.step = Some(RotationStep::RewrapDatabaseKey);
        record.encrypted_db_key_backup = Some(SealedBlob {
            iv: hex::encode([7u8; 12]),
            data: hex::encode([9u8; 48]),
        });
        journal.write(&record).unwrap();

        let read_back = journal.read().unwrap();
        let blob = read_back.encrypted_db_key_backup.unwrap();
        assert_eq!(hex::decode(blob.iv).unwrap(), vec![7u8; 12]);
        assert_eq!(hex::decode(blob.data).unwrap(), vec![9u8; 48]);
    }
}
