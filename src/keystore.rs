//! MediaVault - Credential Store
//!
//! Collaborator contract for opaque at-rest credential storage, plus a
//! file-backed implementation. On device builds the trait is backed by the
//! platform keystore; the file implementation covers desktop use and tests.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;

use crate::error::VaultResult;

/// Well-known credential ids
pub mod ids {
    /// Recovery phrase words (salt material for key derivation)
    pub const RECOVERY_PHRASE: &str = "recovery.phrase";
    /// Canary file key wrapped under the active master key
    pub const MASTER_CANARY: &str = "master.canary";
    /// Database key wrapped under the active master key
    pub const DATABASE_KEY: &str = "database.key";
    /// Master key copy released by biometric authentication
    pub const BIOMETRIC_MASTER: &str = "biometric.master";
    /// Digest of the configured decoy password
    pub const DECOY_VERIFIER: &str = "decoy.verifier";
}

/// Opaque durable credential storage.
///
/// Implementations provide at-rest encryption; the vault core treats the
/// store as a black box.
pub trait CredentialStore: Send + Sync {
    fn store(&self, id: &str, bytes: &[u8]) -> VaultResult<()>;
    fn load(&self, id: &str) -> VaultResult<Option<Vec<u8>>>;
    fn clear(&self, id: &str) -> VaultResult<()>;
}

/// JSON-file-backed credential store with atomic writes
pub struct FileCredentialStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Open the store file, creating an empty store when absent
    pub fn open(path: &Path) -> VaultResult<Self> {
        let entries = if path.exists() {
            let data = fs::read(path)?;
            serde_json::from_slice(&data)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    /// Remove the backing file entirely
    pub fn wipe(&self) -> VaultResult<()> {
        self.entries.lock().clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) -> VaultResult<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");

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
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn store(&self, id: &str, bytes: &[u8]) -> VaultResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(id.to_string(), BASE64.encode(bytes));
        self.persist(&entries)
    }

    fn load(&self, id: &str) -> VaultResult<Option<Vec<u8>>> {
        let entries = self.entries.lock();
        match entries.get(id) {
            Some(encoded) => {
                let bytes = BASE64.decode(encoded).map_err(|e| {
                    crate::error::VaultError::Serialization(format!("credential {id}: {e}"))
                })?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn clear(&self, id: &str) -> VaultResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(id).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_load_clear() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::open(&dir.path().join("keystore.json")).unwrap();

        assert!(store.load("absent").unwrap().is_none());

        store.store(ids::MASTER_CANARY, &[1, 2, 3]).unwrap();
        assert_eq!(store.load(ids::MASTER_CANARY).unwrap(), Some(vec![1, 2, 3]));

        store.clear(ids::MASTER_CANARY).unwrap();
        assert!(store.load(ids::MASTER_CANARY).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");

        {
            let store = FileCredentialStore::open(&path).unwrap();
            store.store(ids::RECOVERY_PHRASE, b"word word word").unwrap();
        }

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert_eq!(
            reopened.load(ids::RECOVERY_PHRASE).unwrap(),
            Some(b"word word word".to_vec())
        );
    }

    #[test]
    fn test_wipe_removes_backing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keystore.json");

        let store = FileCredentialStore::open(&path).unwrap();
        store.store("x", &[0xAA]).unwrap();
        assert!(path.exists());

        store.wipe().unwrap();
        assert!(!path.exists());
        assert!(store.load("x").unwrap().is_none());
    }
}
