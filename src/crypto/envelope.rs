//! MediaVault - Envelope Encryption
//!
//! Wraps per-file keys under the master key with AES-256-GCM and derives
//! the database key via HKDF-SHA256.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{generate_nonce, FileKey, MasterKey, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Serialized length of a wrapped file key: 32-byte key + 16-byte AEAD tag
pub const WRAPPED_KEY_LEN: usize = KEY_LEN + TAG_LEN;

/// HKDF context string for the database key
const DATABASE_KEY_CONTEXT: &[u8] = b"mediavault:database-key:v1";

/// A file key wrapped under the master key
pub struct WrappedKey {
    pub iv: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Wrap a file key under the master key.
///
/// A fresh random IV is generated on every call. IV reuse under the same
/// key is a correctness violation, not a style issue.
pub fn wrap_file_key(fek: &FileKey, master: &MasterKey) -> VaultResult<WrappedKey> {
    wrap_file_key_with_iv(fek, master, generate_nonce())
}

/// Wrap a file key under `master` with a caller-supplied IV.
///
/// Only valid when the (key, IV) pair has never been used before. The
/// header rewrap path relies on this to keep the body counter base stable
/// while the wrapping key changes.
pub(crate) fn wrap_file_key_with_iv(
    fek: &FileKey,
    master: &MasterKey,
    iv: [u8; NONCE_LEN],
) -> VaultResult<WrappedKey> {
    let cipher = Aes256Gcm::new_from_slice(master.expose())
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), fek.expose().as_slice())
        .map_err(|_| VaultError::AuthenticationFailed)?;

    debug_assert_eq!(ciphertext.len(), WRAPPED_KEY_LEN);
    Ok(WrappedKey { iv, ciphertext })
}

/// Unwrap a file key.
///
/// Fails with [`VaultError::AuthenticationFailed`] when the tag does not
/// verify: wrong key, corruption, or tampering, indistinguishable by
/// design. This failure is the canonical "is this the right key for this
/// file" test.
pub fn unwrap_file_key(
    ciphertext: &[u8],
    iv: &[u8; NONCE_LEN],
    master: &MasterKey,
) -> VaultResult<FileKey> {
    let cipher = Aes256Gcm::new_from_slice(master.expose())
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| VaultError::AuthenticationFailed)?,
    );

    if plaintext.len() != KEY_LEN {
        return Err(VaultError::AuthenticationFailed);
    }

    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    bytes.copy_from_slice(&plaintext);
    Ok(FileKey::new(*bytes))
}

/// AEAD-seal arbitrary bytes under the master key with a fresh IV.
///
/// Used for file metadata and keystore blobs.
pub fn seal_bytes(master: &MasterKey, plaintext: &[u8]) -> VaultResult<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(master.expose())
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    let iv = generate_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| VaultError::AuthenticationFailed)?;

    Ok((iv, ciphertext))
}

/// Open bytes sealed with [`seal_bytes`]
pub fn open_bytes(
    master: &MasterKey,
    iv: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(master.expose())
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| VaultError::AuthenticationFailed)
}

/// Seal bytes and serialize as a single `iv || ciphertext` blob
pub fn seal_blob(master: &MasterKey, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let (iv, ct) = seal_bytes(master, plaintext)?;
    let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ct);
    Ok(blob)
}

/// Open a blob produced by [`seal_blob`]
pub fn open_blob(master: &MasterKey, blob: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::AuthenticationFailed);
    }
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&blob[..NONCE_LEN]);
    Ok(Zeroizing::new(open_bytes(master, &iv, &blob[NONCE_LEN..])?))
}

/// Derive the database key from the master key.
///
/// HKDF-SHA256 with a fixed zero salt and fixed context string.
/// Deterministic given the master key, re-derived on demand, never
/// independently persisted in cleartext.
pub fn derive_database_key(master: &MasterKey) -> Zeroizing<[u8; KEY_LEN]> {
    let zero_salt = [0u8; 32];
    let hk = Hkdf::<Sha256>::new(Some(&zero_salt), master.expose());

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(DATABASE_KEY_CONTEXT, okm.as_mut())
        .expect("HKDF expand failed for 32-byte output");

    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let master = MasterKey::generate();
        let fek = FileKey::generate();

        let wrapped = wrap_file_key(&fek, &master).unwrap();
        assert_eq!(wrapped.ciphertext.len(), WRAPPED_KEY_LEN);

        let unwrapped = unwrap_file_key(&wrapped.ciphertext, &wrapped.iv, &master).unwrap();
        assert_eq!(unwrapped.expose(), fek.expose());
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let mk1 = MasterKey::generate();
        let mk2 = MasterKey::generate();
        let fek = FileKey::generate();

        let wrapped = wrap_file_key(&fek, &mk1).unwrap();
        let result = unwrap_file_key(&wrapped.ciphertext, &wrapped.iv, &mk2);

        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
    }

    #[test]
    fn test_fresh_iv_every_wrap() {
        let master = MasterKey::generate();
        let fek = FileKey::generate();

        let w1 = wrap_file_key(&fek, &master).unwrap();
        let w2 = wrap_file_key(&fek, &master).unwrap();

        assert_ne!(w1.iv, w2.iv);
        assert_ne!(w1.ciphertext, w2.ciphertext);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let master = MasterKey::generate();
        let (iv, ct) = seal_bytes(&master, b"metadata payload").unwrap();
        let opened = open_bytes(&master, &iv, &ct).unwrap();
        assert_eq!(opened, b"metadata payload");
    }

    #[test]
    fn test_tampered_seal_fails() {
        let master = MasterKey::generate();
        let (iv, mut ct) = seal_bytes(&master, b"metadata payload").unwrap();
        ct[3] ^= 0xFF;
        assert!(matches!(
            open_bytes(&master, &iv, &ct),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_database_key_deterministic() {
        let master = MasterKey::new([0x42u8; KEY_LEN]);
        let k1 = derive_database_key(&master);
        let k2 = derive_database_key(&master);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_database_key_differs_per_master() {
        let k1 = derive_database_key(&MasterKey::generate());
        let k2 = derive_database_key(&MasterKey::generate());
        assert_ne!(*k1, *k2);
    }
}
