//! # MediaVault
//!
//! Per-file encrypted vault for a personal media application. Files are
//! individually encrypted at rest, one user secret unlocks access for a
//! session, and the secret can be rotated without re-encrypting bulk data.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       MEDIAVAULT                         │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │  SESSION    │   │  FILE CODEC  │   │  ROTATION    │   │
//! │  │  lock/unlock│   │  AES-256-GCM │   │  journal +   │   │
//! │  │  auto-lock  │   │  + AES-CTR   │   │  rewrap      │   │
//! │  └──────┬──────┘   └──────┬───────┘   └──────┬───────┘   │
//! │         │                 │                  │           │
//! │  ┌──────┴─────────────────┴──────────────────┴────────┐  │
//! │  │                 CRYPTO CORE                        │  │
//! │  │  password + phrase ──Argon2id──▶ master key        │  │
//! │  │  master key ──wrap──▶ per-file keys                │  │
//! │  │  master key ──HKDF──▶ database key                 │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Every file carries its own random 256-bit key, wrapped under the
//!   master key inside the container header
//! - The master key is derived from password + 12-word recovery phrase
//!   and never persisted in cleartext
//! - Password rotation rewraps headers only, never bulk data, behind a
//!   durable write-ahead journal
//! - Key material is zeroized on lock

pub mod biometrics;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod journal;
pub mod keystore;
pub mod rotation;
pub mod session;

pub use biometrics::{BiometricAuthenticator, BiometricAvailability, BiometricOutcome, PromptConfig};
pub use codec::{
    rewrap_header, secure_erase, DecryptedStream, FileMetadata, FileVaultCodec, RewrapOutcome,
};
pub use crypto::{Argon2Config, MasterKey, RecoveryPhrase};
pub use error::{VaultError, VaultResult};
pub use journal::{JournalRecord, RotationJournal, RotationState, RotationStep};
pub use keystore::{CredentialStore, FileCredentialStore};
pub use session::{SessionState, VaultConfig, VaultSession};

/// MediaVault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
