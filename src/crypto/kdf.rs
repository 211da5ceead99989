//! MediaVault - Master Key Derivation
//!
//! Derives the master key from a password and the persistent recovery
//! phrase using Argon2id. The phrase supplies the salt material, so a
//! password change never touches it and recovery stays deterministic.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::keys::{MasterKey, KEY_LEN};
use super::phrase::RecoveryPhrase;
use crate::error::{VaultError, VaultResult};

/// Argon2id parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    /// Iterations (time cost)
    pub time_cost: u32,
    /// Working memory in KiB
    pub memory_cost_kib: u32,
    /// Parallelism
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024, // 64 MiB
            parallelism: 4,
        }
    }
}

impl Argon2Config {
    /// Reduced-memory profile for constrained devices
    pub fn low_memory() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 16 * 1024, // 16 MiB
            parallelism: 2,
        }
    }
}

/// Derive the master key from a password and recovery phrase.
///
/// Deterministic: identical inputs always yield an identical key. This is
/// what makes password verification and recovery possible without ever
/// storing the password.
pub fn derive_master_key(
    password: &str,
    phrase: &RecoveryPhrase,
    config: &Argon2Config,
) -> VaultResult<MasterKey> {
    if password.is_empty() {
        return Err(VaultError::InvalidCredential("empty password".into()));
    }

    // Salt = SHA-256 over the phrase words joined by single spaces.
    let salt = phrase_salt(phrase);

    let params = Params::new(
        config.memory_cost_kib,
        config.time_cost,
        config.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut output)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(MasterKey::new(output))
}

fn phrase_salt(phrase: &RecoveryPhrase) -> [u8; 32] {
    let mut hasher = Sha256::new();
    let joined = phrase.join_words();
    hasher.update(joined.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> Argon2Config {
        Argon2Config {
            time_cost: 1,
            memory_cost_kib: 1024,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derivation_deterministic() {
        let phrase = RecoveryPhrase::generate();
        let cfg = fast_config();

        let k1 = derive_master_key("Secret123!", &phrase, &cfg).unwrap();
        let k2 = derive_master_key("Secret123!", &phrase, &cfg).unwrap();

        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_different_password_different_key() {
        let phrase = RecoveryPhrase::generate();
        let cfg = fast_config();

        let k1 = derive_master_key("Secret123!", &phrase, &cfg).unwrap();
        let k2 = derive_master_key("secret123!", &phrase, &cfg).unwrap();

        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_different_phrase_different_key() {
        let cfg = fast_config();
        let p1 = RecoveryPhrase::generate();
        let p2 = RecoveryPhrase::generate();

        let k1 = derive_master_key("Secret123!", &p1, &cfg).unwrap();
        let k2 = derive_master_key("Secret123!", &p2, &cfg).unwrap();

        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_empty_password_rejected() {
        let phrase = RecoveryPhrase::generate();
        let result = derive_master_key("", &phrase, &fast_config());
        assert!(matches!(result, Err(VaultError::InvalidCredential(_))));
    }
}
