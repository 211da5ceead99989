//! MediaVault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CREDENTIAL / CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// AEAD tag mismatch. Wrong key, corruption and tampering are
    /// indistinguishable by design.
    #[error("Authentication failed - wrong key, corruption, or tampering")]
    AuthenticationFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("No stored recovery data available")]
    RecoveryDataMissing,

    #[error("Too many failed attempts - vault locked down")]
    TooManyAttempts,

    // ═══════════════════════════════════════════════════════════════
    // SESSION / ROTATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Vault is locked")]
    VaultLocked,

    #[error("A key rotation is already in progress")]
    RotationInProgress,

    #[error("Key rotation failed: {0}")]
    RotationFailed(String),

    #[error("Biometric unlock unavailable: {0}")]
    BiometricUnavailable(String),

    #[error("Biometric authentication failed: {0}")]
    BiometricFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // FILE / FORMAT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u8),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Vault already exists at: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Check if this error indicates a cryptographic verification failure
    pub fn is_crypto_failure(&self) -> bool {
        matches!(
            self,
            VaultError::AuthenticationFailed | VaultError::KeyDerivationFailed(_)
        )
    }

    /// Check if this error requires routing the user through manual recovery
    pub fn requires_recovery(&self) -> bool {
        matches!(
            self,
            VaultError::RotationFailed(_) | VaultError::RotationInProgress
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
