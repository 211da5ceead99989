//! MediaVault - Vault Session
//!
//! Lock/unlock state machine around the single master-key slot. The slot
//! hands out `Arc` references so every operation pins the key it started
//! with; a concurrent `lock()` clears the slot without invalidating
//! in-flight streams.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::biometrics::{BiometricAuthenticator, BiometricAvailability, BiometricOutcome, PromptConfig};
use crate::codec::{self, DecryptedStream, FileMetadata, FileVaultCodec, VAULT_EXT};
use crate::crypto::{
    derive_database_key, derive_master_key, open_blob, seal_blob, unwrap_file_key, wrap_file_key,
    Argon2Config, FileKey, MasterKey, RecoveryPhrase, KEY_LEN, NONCE_LEN,
};
use crate::error::{VaultError, VaultResult};
use crate::journal::{RotationJournal, RotationState};
use crate::keystore::{ids, CredentialStore, FileCredentialStore};

/// Vault configuration file name
pub const CONFIG_FILE: &str = "config.json";

/// Credential store file name
const KEYSTORE_FILE: &str = "keystore.json";

/// Directory holding encrypted media containers
const MEDIA_DIR: &str = "media";

/// Domain separator for the decoy password digest
const DECOY_DOMAIN: &[u8] = b"mediavault:decoy:v1";

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Auto-lock timeout in milliseconds. 0 = lock immediately on
    /// foreground, -1 = never auto-lock.
    pub auto_lock_timeout_ms: i64,
    /// Overwrite passes for secure erase of plaintext sources
    pub secure_erase_passes: u32,
    /// Failed unlock attempts before lockdown
    pub max_failed_attempts: u8,
    /// Argon2id parameters for master-key derivation
    pub argon2: Argon2Config,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout_ms: 60_000,
            secure_erase_passes: 3,
            max_failed_attempts: 5,
            argon2: Argon2Config::default(),
        }
    }
}

/// Ephemeral session state, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked {
        unlocked_at: DateTime<Utc>,
        auto_lock_enabled: bool,
    },
}

struct ActiveKey {
    key: Arc<MasterKey>,
    unlocked_at: DateTime<Utc>,
    auto_lock_enabled: bool,
}

// ---------------------------------------------------------------------------
// Session controller
// ---------------------------------------------------------------------------

/// Vault session controller.
///
/// Owns the master-key slot, drives unlock/lock/auto-lock, and exposes the
/// database-key consumer surface. Password rotation lives in
/// [`crate::rotation`].
pub struct VaultSession {
    root: PathBuf,
    config: RwLock<VaultConfig>,
    keystore: Arc<dyn CredentialStore>,
    journal: RotationJournal,
    active: Mutex<Option<ActiveKey>>,
    background_since: Mutex<Option<DateTime<Utc>>>,
    failed_attempts: Mutex<u8>,
    lockdown: AtomicBool,
    pub(crate) rotation_gate: Mutex<()>,
    panic_hook: Mutex<Box<dyn Fn() + Send + Sync>>,
}

impl VaultSession {
    // ═══════════════════════════════════════════════════════════════════════
    // SETUP / OPEN
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a new vault at `root`.
    ///
    /// Generates the recovery phrase, derives the master key, seeds the
    /// canary verifier and the wrapped database key, and returns the
    /// session already unlocked. The phrase is returned exactly once for
    /// the user to write down; it is also kept in the credential store as
    /// salt material for password-only unlock.
    pub fn setup(
        root: &Path,
        password: &str,
        config: VaultConfig,
    ) -> VaultResult<(Self, RecoveryPhrase)> {
        if root.join(CONFIG_FILE).exists() {
            return Err(VaultError::AlreadyExists(root.display().to_string()));
        }

        fs::create_dir_all(root.join(MEDIA_DIR))?;

        let phrase = RecoveryPhrase::generate();
        let master = derive_master_key(password, &phrase, &config.argon2)?;

        let keystore: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::open(&root.join(KEYSTORE_FILE))?);
        keystore.store(ids::RECOVERY_PHRASE, phrase.join_words().as_bytes())?;
        write_canary(keystore.as_ref(), &master)?;

        // Materialize the database key wrapped under the master key so a
        // later rotation can re-wrap it in O(1).
        let db_key = derive_database_key(&master);
        keystore.store(ids::DATABASE_KEY, &seal_blob(&master, db_key.as_ref())?)?;

        fs::write(root.join(CONFIG_FILE), serde_json::to_vec_pretty(&config)?)?;

        let session = Self::assemble(root, config, keystore);
        session.install_active(master);
        log::info!("vault created at {}", root.display());

        Ok((session, phrase))
    }

    /// Open an existing vault. The session starts locked.
    pub fn open(root: &Path) -> VaultResult<Self> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(VaultError::FileNotFound(root.display().to_string()));
        }

        let config: VaultConfig = serde_json::from_slice(&fs::read(config_path)?)?;
        let keystore: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::open(&root.join(KEYSTORE_FILE))?);

        Ok(Self::assemble(root, config, keystore))
    }

    fn assemble(root: &Path, config: VaultConfig, keystore: Arc<dyn CredentialStore>) -> Self {
        Self {
            root: root.to_path_buf(),
            config: RwLock::new(config),
            keystore,
            journal: RotationJournal::new(root),
            active: Mutex::new(None),
            background_since: Mutex::new(None),
            failed_attempts: Mutex::new(0),
            lockdown: AtomicBool::new(false),
            rotation_gate: Mutex::new(()),
            panic_hook: Mutex::new(Box::new(|| std::process::exit(86))),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // UNLOCK / LOCK
    // ═══════════════════════════════════════════════════════════════════════

    /// Unlock the vault with a password.
    ///
    /// The decoy input, when configured, is checked before normal
    /// verification and destroys the vault on match. An interrupted
    /// rotation blocks unlock until manual recovery.
    pub fn unlock(&self, password: &str) -> VaultResult<()> {
        if self.lockdown.load(Ordering::SeqCst) {
            return Err(VaultError::TooManyAttempts);
        }

        if self.decoy_matches(password)? {
            self.panic_wipe()?;
            return Err(VaultError::InvalidCredential("vault destroyed".into()));
        }

        self.ensure_rotation_idle()?;

        let phrase = self.load_phrase()?;
        let key = derive_master_key(password, &phrase, &self.config.read().argon2)?;

        if self.canary_matches(&key)? {
            *self.failed_attempts.lock() = 0;
            self.install_active(key);
            log::info!("vault unlocked");
            Ok(())
        } else {
            let mut attempts = self.failed_attempts.lock();
            *attempts += 1;
            if *attempts >= self.config.read().max_failed_attempts {
                self.lockdown.store(true, Ordering::SeqCst);
                log::warn!("unlock attempt limit reached, vault locked down");
                return Err(VaultError::TooManyAttempts);
            }
            Err(VaultError::AuthenticationFailed)
        }
    }

    /// Check a password without changing session state
    pub fn verify_password(&self, password: &str) -> VaultResult<bool> {
        let phrase = self.load_phrase()?;
        let key = derive_master_key(password, &phrase, &self.config.read().argon2)?;
        self.canary_matches(&key)
    }

    /// Unlock using the platform biometric capability.
    ///
    /// Valid only when no rotation is pending: biometric unlock bypasses
    /// password verification, so it must never run over a half-migrated
    /// vault. Requires prior enrollment via [`Self::enroll_biometric`].
    pub async fn unlock_with_biometric(
        &self,
        authenticator: &dyn BiometricAuthenticator,
        prompt: &PromptConfig,
    ) -> VaultResult<()> {
        if self.lockdown.load(Ordering::SeqCst) {
            return Err(VaultError::TooManyAttempts);
        }
        self.ensure_rotation_idle()?;

        match authenticator.check_availability() {
            BiometricAvailability::Available => {}
            other => {
                return Err(VaultError::BiometricUnavailable(format!("{other:?}")));
            }
        }

        match authenticator.authenticate(prompt).await {
            BiometricOutcome::Success => {}
            BiometricOutcome::Cancelled => {
                return Err(VaultError::BiometricFailed("cancelled".into()));
            }
            BiometricOutcome::Error(msg) => return Err(VaultError::BiometricFailed(msg)),
        }

        let stored = self
            .keystore
            .load(ids::BIOMETRIC_MASTER)?
            .ok_or_else(|| VaultError::BiometricUnavailable("not enrolled".into()))?;
        let stored = Zeroizing::new(stored);

        if stored.len() != KEY_LEN {
            return Err(VaultError::BiometricFailed("stored credential corrupt".into()));
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(&stored);
        let key = MasterKey::new(*bytes);

        // Guard against a stale copy left behind by an external restore.
        if !self.canary_matches(&key)? {
            return Err(VaultError::BiometricFailed("stored credential stale".into()));
        }

        *self.failed_attempts.lock() = 0;
        self.install_active(key);
        log::info!("vault unlocked via biometric");
        Ok(())
    }

    /// Store the master key for biometric release. Requires an unlocked
    /// session.
    pub fn enroll_biometric(&self) -> VaultResult<()> {
        let key = self.active_key()?;
        self.keystore.store(ids::BIOMETRIC_MASTER, key.expose())
    }

    /// Remove the biometric master-key copy
    pub fn unenroll_biometric(&self) -> VaultResult<()> {
        self.keystore.clear(ids::BIOMETRIC_MASTER)
    }

    /// Lock the vault, clearing the master-key slot.
    ///
    /// References handed out before this call stay valid for their own
    /// in-flight operations; the key material is zeroized once the last
    /// reference drops.
    pub fn lock(&self) {
        *self.active.lock() = None;
        log::info!("vault locked");
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        match self.active.lock().as_ref() {
            Some(active) => SessionState::Unlocked {
                unlocked_at: active.unlocked_at,
                auto_lock_enabled: active.auto_lock_enabled,
            },
            None => SessionState::Locked,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Take a stable reference to the active master key
    pub fn active_key(&self) -> VaultResult<Arc<MasterKey>> {
        self.active
            .lock()
            .as_ref()
            .map(|a| Arc::clone(&a.key))
            .ok_or(VaultError::VaultLocked)
    }

    /// Run `action` with the active key, or fail with `VaultLocked`
    pub fn require_unlocked<T>(
        &self,
        action: impl FnOnce(&Arc<MasterKey>) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let key = self.active_key()?;
        action(&key)
    }

    /// Run `action` with the active key, or return `None` when locked
    pub fn if_unlocked<T>(
        &self,
        action: impl FnOnce(&Arc<MasterKey>) -> VaultResult<T>,
    ) -> VaultResult<Option<T>> {
        match self.active_key() {
            Ok(key) => action(&key).map(Some),
            Err(VaultError::VaultLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AUTO-LOCK
    // ═══════════════════════════════════════════════════════════════════════

    /// Record the transition to background
    pub fn note_background(&self) {
        self.note_background_at(Utc::now());
    }

    pub fn note_background_at(&self, at: DateTime<Utc>) {
        *self.background_since.lock() = Some(at);
    }

    /// Handle the return to foreground; returns `true` when the elapsed
    /// background time forced a lock.
    ///
    /// Cooperative, not preemptive: driven by lifecycle notifications, not
    /// by a timer running while suspended.
    pub fn note_foreground(&self) -> bool {
        self.note_foreground_at(Utc::now())
    }

    pub fn note_foreground_at(&self, at: DateTime<Utc>) -> bool {
        let since = self.background_since.lock().take();
        let Some(background_at) = since else {
            return false;
        };

        let enabled = self
            .active
            .lock()
            .as_ref()
            .map(|a| a.auto_lock_enabled)
            .unwrap_or(false);
        if !enabled {
            return false;
        }

        let timeout = self.config.read().auto_lock_timeout_ms;
        if timeout < 0 {
            return false;
        }

        let elapsed = (at - background_at).num_milliseconds();
        if elapsed >= timeout {
            self.lock();
            log::info!("auto-lock after {elapsed}ms in background");
            true
        } else {
            false
        }
    }

    /// Enable or disable auto-lock for the current unlock
    pub fn set_auto_lock_enabled(&self, enabled: bool) {
        if let Some(active) = self.active.lock().as_mut() {
            active.auto_lock_enabled = enabled;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DECOY / PANIC WIPE
    // ═══════════════════════════════════════════════════════════════════════

    /// Configure a decoy password. On any later unlock attempt matching
    /// it, the vault destroys itself instead of unlocking.
    pub fn set_decoy_password(&self, decoy: &str) -> VaultResult<()> {
        self.active_key()?;
        if decoy.is_empty() {
            return Err(VaultError::InvalidCredential("empty decoy password".into()));
        }
        self.keystore
            .store(ids::DECOY_VERIFIER, &decoy_digest(decoy))
    }

    fn decoy_matches(&self, password: &str) -> VaultResult<bool> {
        match self.keystore.load(ids::DECOY_VERIFIER)? {
            Some(stored) => Ok(stored == decoy_digest(password)),
            None => Ok(false),
        }
    }

    /// Irreversibly destroy all vault data, then invoke the terminate
    /// hook.
    pub fn panic_wipe(&self) -> VaultResult<()> {
        log::warn!("panic wipe triggered");
        self.lock();

        let passes = self.config.read().secure_erase_passes;
        let media = self.media_dir();
        if media.exists() {
            for entry in walkdir::WalkDir::new(&media)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                codec::secure_erase(entry.path(), passes)?;
            }
            let _ = fs::remove_dir_all(&media);
        }

        for id in [
            ids::RECOVERY_PHRASE,
            ids::MASTER_CANARY,
            ids::DATABASE_KEY,
            ids::BIOMETRIC_MASTER,
            ids::DECOY_VERIFIER,
        ] {
            self.keystore.clear(id)?;
        }

        self.journal.clear()?;
        let _ = fs::remove_file(self.root.join(CONFIG_FILE));

        (self.panic_hook.lock())();
        Ok(())
    }

    /// Replace the process-terminate hook invoked after a panic wipe
    pub fn set_panic_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.panic_hook.lock() = Box::new(hook);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DATABASE KEY
    // ═══════════════════════════════════════════════════════════════════════

    /// Database key for the external encrypted-database engine.
    ///
    /// Unwrapped on demand from the credential store, never cached to
    /// disk in cleartext. Falls back to HKDF derivation (persisting the
    /// wrapped copy) for vaults that predate the wrapped-key record.
    pub fn database_key(&self) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
        let key = self.active_key()?;

        if let Some(blob) = self.keystore.load(ids::DATABASE_KEY)? {
            let plain = open_blob(&key, &blob)?;
            if plain.len() != KEY_LEN {
                return Err(VaultError::AuthenticationFailed);
            }
            let mut out = Zeroizing::new([0u8; KEY_LEN]);
            out.copy_from_slice(&plain);
            return Ok(out);
        }

        let db_key = derive_database_key(&key);
        self.keystore
            .store(ids::DATABASE_KEY, &seal_blob(&key, db_key.as_ref())?)?;
        Ok(db_key)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MEDIA OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Directory holding the encrypted containers
    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    fn media_path(&self, id: &str) -> PathBuf {
        self.media_dir().join(format!("{id}.{VAULT_EXT}"))
    }

    /// Encrypt a source file into the vault; returns the new media id.
    ///
    /// With `wipe_source`, the plaintext source is securely erased after
    /// a successful import.
    pub fn import_file(&self, source: &Path, wipe_source: bool) -> VaultResult<String> {
        let key = self.active_key()?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".into());

        let mut reader = File::open(source)?;
        let mut head = [0u8; 64];
        let head_len = reader.read(&mut head)?;
        reader.seek(SeekFrom::Start(0))?;
        let metadata = FileMetadata::for_source(&original_name, &head[..head_len]);

        let id = Uuid::new_v4().to_string();
        let dest = self.media_path(&id);
        fs::create_dir_all(self.media_dir())?;

        FileVaultCodec::new(key).encrypt(&mut reader, &dest, &metadata)?;
        log::info!("imported {original_name} as {id}");

        if wipe_source {
            codec::secure_erase(source, self.config.read().secure_erase_passes)?;
        }

        Ok(id)
    }

    /// Open a lazily decrypting stream over a stored container
    pub fn open_media(&self, id: &str) -> VaultResult<DecryptedStream<io::BufReader<File>>> {
        let key = self.active_key()?;
        FileVaultCodec::new(key).open(&self.media_path(id))
    }

    /// List stored media with decrypted metadata
    pub fn list_media(&self) -> VaultResult<Vec<(String, FileMetadata)>> {
        let key = self.active_key()?;
        let codec = FileVaultCodec::new(key);
        let mut items = Vec::new();

        let media = self.media_dir();
        if !media.exists() {
            return Ok(items);
        }

        for entry in walkdir::WalkDir::new(&media)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VAULT_EXT) {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            items.push((id, codec.read_metadata(path)?));
        }

        items.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));
        Ok(items)
    }

    /// Decrypt a container to `dest` on a blocking worker.
    ///
    /// Streaming is I/O-bound and runs off the caller's thread; each
    /// export gets its own worker.
    pub async fn export_media(&self, id: &str, dest: &Path) -> VaultResult<u64> {
        let key = self.active_key()?;
        let src = self.media_path(id);
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> VaultResult<u64> {
            let mut stream = FileVaultCodec::new(key).open(&src)?;
            let mut out = File::create(&dest)?;
            let written = io::copy(&mut stream, &mut out)?;
            out.sync_all()?;
            Ok(written)
        })
        .await
        .map_err(|e| VaultError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Current rotation journal state, for startup checks and status
    /// surfaces. `InProgress` or `Failed` means unlock stays blocked until
    /// [`Self::recover_rotation`] completes.
    pub fn rotation_state(&self) -> VaultResult<RotationState> {
        self.journal.state()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERNALS (shared with the rotation protocol)
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn install_active(&self, key: MasterKey) {
        *self.active.lock() = Some(ActiveKey {
            key: Arc::new(key),
            unlocked_at: Utc::now(),
            auto_lock_enabled: true,
        });
    }

    pub(crate) fn journal(&self) -> &RotationJournal {
        &self.journal
    }

    pub(crate) fn keystore(&self) -> &Arc<dyn CredentialStore> {
        &self.keystore
    }

    pub(crate) fn argon2(&self) -> Argon2Config {
        self.config.read().argon2.clone()
    }

    pub(crate) fn load_phrase(&self) -> VaultResult<RecoveryPhrase> {
        let raw = self
            .keystore
            .load(ids::RECOVERY_PHRASE)?
            .ok_or(VaultError::RecoveryDataMissing)?;
        let raw = Zeroizing::new(raw);
        let text = Zeroizing::new(
            String::from_utf8(raw.to_vec())
                .map_err(|_| VaultError::RecoveryDataMissing)?,
        );
        RecoveryPhrase::parse(&text)
    }

    pub(crate) fn canary_matches(&self, key: &MasterKey) -> VaultResult<bool> {
        let blob = self
            .keystore
            .load(ids::MASTER_CANARY)?
            .ok_or(VaultError::RecoveryDataMissing)?;
        if blob.len() < NONCE_LEN {
            return Err(VaultError::RecoveryDataMissing);
        }

        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&blob[..NONCE_LEN]);
        match unwrap_file_key(&blob[NONCE_LEN..], &iv, key) {
            Ok(_) => Ok(true),
            Err(VaultError::AuthenticationFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn write_canary(&self, key: &MasterKey) -> VaultResult<()> {
        write_canary(self.keystore.as_ref(), key)
    }

    fn ensure_rotation_idle(&self) -> VaultResult<()> {
        match self.journal.state()? {
            RotationState::Idle => Ok(()),
            RotationState::InProgress => Err(VaultError::RotationInProgress),
            RotationState::Failed => Err(VaultError::RotationFailed(
                "previous rotation failed, manual recovery required".into(),
            )),
        }
    }
}

/// Seed a fresh canary: a throwaway file key wrapped under `key`. A later
/// unwrap attempt is the password verifier.
fn write_canary(store: &dyn CredentialStore, key: &MasterKey) -> VaultResult<()> {
    let canary = FileKey::generate();
    let wrapped = wrap_file_key(&canary, key)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + wrapped.ciphertext.len());
    blob.extend_from_slice(&wrapped.iv);
    blob.extend_from_slice(&wrapped.ciphertext);
    store.store(ids::MASTER_CANARY, &blob)
}

fn decoy_digest(password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(DECOY_DOMAIN);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
