//! MediaVault - Key Material
//!
//! Wrappers for the master key and per-file keys with automatic zeroization.

use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// AEAD authentication tag length
pub const TAG_LEN: usize = 16;

/// Domain separator for master-key fingerprints
const KEY_ID_DOMAIN: &[u8] = b"mediavault:keyid:v1";

/// Root symmetric key for a vault session.
///
/// Derived from password + recovery phrase, held only in process memory
/// while the session is unlocked. Never persisted in cleartext.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    inner: Secret<[u8; KEY_LEN]>,
}

impl MasterKey {
    /// Create a master key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Short hex fingerprint identifying this key without revealing it.
    ///
    /// Used by the rotation journal to record which key an interrupted
    /// migration was moving from and to.
    pub fn key_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(KEY_ID_DOMAIN);
        hasher.update(self.expose());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Generate a random master key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

/// Random per-file encryption key (FEK).
///
/// Generated at encryption time, persisted only in wrapped form inside the
/// file header, dropped from memory once streaming completes.
#[derive(Clone, ZeroizeOnDrop)]
pub struct FileKey {
    #[zeroize(skip)]
    inner: Secret<[u8; KEY_LEN]>,
}

impl FileKey {
    /// Create a file key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random file key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_stable() {
        let key = MasterKey::new([0x42u8; KEY_LEN]);
        assert_eq!(key.key_id(), key.key_id());
        assert_eq!(key.key_id().len(), 16);
    }

    #[test]
    fn test_key_id_differs_per_key() {
        let a = MasterKey::generate();
        let b = MasterKey::generate();
        assert_ne!(a.key_id(), b.key_id());
    }

    #[test]
    fn test_nonce_randomness() {
        // Two fresh nonces colliding would be a catastrophic RNG failure
        assert_ne!(generate_nonce(), generate_nonce());
    }
}
