//! MediaVault - Cryptographic Core
//!
//! Key hierarchy: password + recovery phrase -> master key (Argon2id);
//! master key wraps random per-file keys and derives the database key.

pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod phrase;
pub mod wordlist;

pub use envelope::{
    derive_database_key, open_blob, open_bytes, seal_blob, seal_bytes, unwrap_file_key,
    wrap_file_key, WrappedKey, WRAPPED_KEY_LEN,
};
pub use kdf::{derive_master_key, Argon2Config};
pub use keys::{generate_nonce, FileKey, MasterKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use phrase::{RecoveryPhrase, ENTROPY_LEN, PHRASE_WORDS};
