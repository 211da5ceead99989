//! MediaVault - Encrypted File Container
//!
//! Container layout (byte-exact):
//! ```text
//! [1B version][12B wrap_iv][48B wrapped_fek (32B key + 16B tag)]
//! [4B metadata_len][metadata_len bytes encrypted_metadata]
//! [remaining: counter-mode body]
//! encrypted_metadata = [12B iv][ciphertext][16B AEAD tag]
//! ```
//!
//! The body is AES-256-CTR keyed by the unwrapped file key; the initial
//! counter block is the wrap IV zero-extended to 16 bytes. Bodies stream
//! in fixed 8 KiB chunks, so memory stays O(chunk) regardless of file size.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes::Aes256;
use chrono::{DateTime, Utc};
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    envelope, unwrap_file_key, wrap_file_key, FileKey, MasterKey, NONCE_LEN, TAG_LEN,
    WRAPPED_KEY_LEN,
};
use crate::error::{VaultError, VaultResult};

/// Current container format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Streaming chunk size
pub const CHUNK_SIZE: usize = 8 * 1024;

/// File extension for encrypted containers
pub const VAULT_EXT: &str = "enc";

/// Upper bound for the encrypted metadata block
const MAX_METADATA_LEN: usize = 64 * 1024;

/// Fixed header prefix: version + wrap_iv + wrapped_fek + metadata_len
const HEADER_PREFIX_LEN: usize = 1 + NONCE_LEN + WRAPPED_KEY_LEN + 4;

type BodyCipher = Ctr128BE<Aes256>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Per-file metadata, stored AEAD-encrypted inside the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original filename before import
    pub original_name: String,
    /// MIME type sniffed at import time
    pub mime_type: String,
    /// Import timestamp
    pub created_at: DateTime<Utc>,
}

impl FileMetadata {
    /// Build metadata for a source file, sniffing the MIME type from its
    /// leading bytes
    pub fn for_source(original_name: &str, head: &[u8]) -> Self {
        Self {
            original_name: original_name.to_string(),
            mime_type: detect_mime(head).to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Detect a media MIME type from magic bytes
pub fn detect_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() > 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        "image/webp"
    } else if data.len() > 12 && &data[4..8] == b"ftyp" {
        match &data[8..12] {
            b"heic" | b"heix" => "image/heic",
            b"mif1" => "image/heif",
            b"mp41" | b"mp42" | b"isom" => "video/mp4",
            _ => "application/octet-stream",
        }
    } else {
        "application/octet-stream"
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed container header
pub struct FileHeader {
    pub version: u8,
    pub wrap_iv: [u8; NONCE_LEN],
    pub wrapped_fek: [u8; WRAPPED_KEY_LEN],
    /// `[12B iv][ciphertext || 16B tag]`
    pub encrypted_metadata: Vec<u8>,
}

impl FileHeader {
    /// Total serialized length in bytes
    pub fn serialized_len(&self) -> usize {
        HEADER_PREFIX_LEN + self.encrypted_metadata.len()
    }

    /// Serialize to the byte-exact wire layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.push(self.version);
        out.extend_from_slice(&self.wrap_iv);
        out.extend_from_slice(&self.wrapped_fek);
        out.extend_from_slice(&(self.encrypted_metadata.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.encrypted_metadata);
        out
    }

    /// Read and validate a header from the start of a stream
    pub fn read_from<R: Read>(reader: &mut R) -> VaultResult<Self> {
        let mut version = [0u8; 1];
        read_header_bytes(reader, &mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(VaultError::UnsupportedVersion(version[0]));
        }

        let mut wrap_iv = [0u8; NONCE_LEN];
        read_header_bytes(reader, &mut wrap_iv)?;

        let mut wrapped_fek = [0u8; WRAPPED_KEY_LEN];
        read_header_bytes(reader, &mut wrapped_fek)?;

        let mut len_bytes = [0u8; 4];
        read_header_bytes(reader, &mut len_bytes)?;
        let metadata_len = u32::from_be_bytes(len_bytes) as usize;

        if metadata_len < NONCE_LEN + TAG_LEN || metadata_len > MAX_METADATA_LEN {
            return Err(VaultError::InvalidFormat(format!(
                "metadata length {metadata_len} out of range"
            )));
        }

        let mut encrypted_metadata = vec![0u8; metadata_len];
        read_header_bytes(reader, &mut encrypted_metadata)?;

        Ok(Self {
            version: version[0],
            wrap_iv,
            wrapped_fek,
            encrypted_metadata,
        })
    }
}

fn read_header_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> VaultResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            VaultError::InvalidFormat("truncated header".into())
        } else {
            VaultError::Io(e)
        }
    })
}

/// Split an encrypted metadata block into (iv, ciphertext)
fn split_sealed(blob: &[u8]) -> VaultResult<([u8; NONCE_LEN], &[u8])> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidFormat("metadata block too short".into()));
    }
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&blob[..NONCE_LEN]);
    Ok((iv, &blob[NONCE_LEN..]))
}

/// Counter-mode cipher over the body, initial counter block = wrap IV
/// zero-extended to 16 bytes
fn body_cipher(fek: &FileKey, wrap_iv: &[u8; NONCE_LEN]) -> BodyCipher {
    let mut counter_block = [0u8; 16];
    counter_block[..NONCE_LEN].copy_from_slice(wrap_iv);
    BodyCipher::new(
        GenericArray::from_slice(fek.expose()),
        GenericArray::from_slice(&counter_block),
    )
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Streaming encrypt/decrypt over the container format.
///
/// Holds its own reference to the master key for the whole operation, so a
/// concurrent session lock cannot invalidate key material underneath an
/// in-flight stream.
pub struct FileVaultCodec {
    master: Arc<MasterKey>,
}

impl FileVaultCodec {
    pub fn new(master: Arc<MasterKey>) -> Self {
        Self { master }
    }

    /// Encrypt `source` into a container at `dest`.
    ///
    /// Generates a random file key, wraps it under the master key, seals
    /// the metadata with an independent IV, then streams the body. Any
    /// partial output is deleted on failure. Atomic replacement of an
    /// existing file is the caller's concern (temp-file-then-rename).
    ///
    /// Returns the number of body bytes written.
    pub fn encrypt<R: Read>(
        &self,
        source: &mut R,
        dest: &Path,
        metadata: &FileMetadata,
    ) -> VaultResult<u64> {
        match self.encrypt_inner(source, dest, metadata) {
            Ok(written) => Ok(written),
            Err(e) => {
                let _ = fs::remove_file(dest);
                Err(e)
            }
        }
    }

    fn encrypt_inner<R: Read>(
        &self,
        source: &mut R,
        dest: &Path,
        metadata: &FileMetadata,
    ) -> VaultResult<u64> {
        let fek = FileKey::generate();
        let wrapped = wrap_file_key(&fek, &self.master)?;

        let meta_plain = Zeroizing::new(bincode::serialize(metadata)?);
        // Independent random IV for the metadata AEAD; never the wrap IV.
        let (meta_iv, meta_ct) = envelope::seal_bytes(&self.master, &meta_plain)?;

        let mut encrypted_metadata = Vec::with_capacity(NONCE_LEN + meta_ct.len());
        encrypted_metadata.extend_from_slice(&meta_iv);
        encrypted_metadata.extend_from_slice(&meta_ct);

        let header = FileHeader {
            version: FORMAT_VERSION,
            wrap_iv: wrapped.iv,
            wrapped_fek: wrapped
                .ciphertext
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::InvalidFormat("bad wrapped key length".into()))?,
            encrypted_metadata,
        };

        let file = File::create(dest)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.to_bytes())?;

        let mut cipher = body_cipher(&fek, &header.wrap_iv);
        let mut chunk = Zeroizing::new([0u8; CHUNK_SIZE]);
        let mut written: u64 = 0;

        loop {
            let n = source.read(&mut chunk[..])?;
            if n == 0 {
                break;
            }
            cipher.apply_keystream(&mut chunk[..n]);
            writer.write_all(&chunk[..n])?;
            written += n as u64;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(written)
    }

    /// Open a container for streaming decryption.
    ///
    /// The returned stream decrypts lazily as it is read; the plaintext is
    /// never materialized in full.
    pub fn open(&self, path: &Path) -> VaultResult<DecryptedStream<BufReader<File>>> {
        if !path.exists() {
            return Err(VaultError::FileNotFound(path.display().to_string()));
        }

        let mut reader = BufReader::new(File::open(path)?);
        let header = FileHeader::read_from(&mut reader)?;

        let fek = unwrap_file_key(&header.wrapped_fek, &header.wrap_iv, &self.master)?;
        let metadata = decrypt_metadata(&self.master, &header)?;
        let cipher = body_cipher(&fek, &header.wrap_iv);

        Ok(DecryptedStream {
            metadata,
            inner: reader,
            cipher,
        })
    }

    /// Decrypt only the metadata from a container header
    pub fn read_metadata(&self, path: &Path) -> VaultResult<FileMetadata> {
        let mut reader = BufReader::new(File::open(path)?);
        let header = FileHeader::read_from(&mut reader)?;
        decrypt_metadata(&self.master, &header)
    }
}

fn decrypt_metadata(master: &MasterKey, header: &FileHeader) -> VaultResult<FileMetadata> {
    let (iv, ct) = split_sealed(&header.encrypted_metadata)?;
    let plain = Zeroizing::new(envelope::open_bytes(master, &iv, ct)?);
    Ok(bincode::deserialize(&plain)?)
}

/// Lazily decrypting reader over a container body
pub struct DecryptedStream<R: Read> {
    metadata: FileMetadata,
    inner: R,
    cipher: BodyCipher,
}

impl<R: Read> DecryptedStream<R> {
    /// Metadata decrypted from the container header
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }
}

impl<R: Read> Read for DecryptedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Header rewrap (key rotation)
// ---------------------------------------------------------------------------

/// Result of a header rewrap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewrapOutcome {
    /// Header was rewritten under the new key
    Rewrapped,
    /// File key already unwraps under the new key; nothing to do
    AlreadyCurrent,
}

/// Re-wrap a container's file key and metadata from `old` to `new`.
///
/// The wrap IV is preserved: the body counter block derives from it and
/// the body is not rewritten. The (key, IV) pair stays unique because the
/// wrapping key changes. Overwrites the header in place only when the new
/// header's byte length exactly equals the old one; otherwise copies
/// header + body to a temp file, atomically swaps it in, and securely
/// erases the superseded container.
pub fn rewrap_header(
    path: &Path,
    old: &MasterKey,
    new: &MasterKey,
) -> VaultResult<RewrapOutcome> {
    let old_header = {
        let mut reader = BufReader::new(File::open(path)?);
        FileHeader::read_from(&mut reader)?
    };

    // Idempotent retry support: detect "already migrated" first.
    if unwrap_file_key(&old_header.wrapped_fek, &old_header.wrap_iv, new).is_ok() {
        return Ok(RewrapOutcome::AlreadyCurrent);
    }

    let fek = unwrap_file_key(&old_header.wrapped_fek, &old_header.wrap_iv, old)?;
    let (meta_iv, meta_ct) = split_sealed(&old_header.encrypted_metadata)?;
    let meta_plain = Zeroizing::new(envelope::open_bytes(old, &meta_iv, meta_ct)?);

    let rewrapped = envelope::wrap_file_key_with_iv(&fek, new, old_header.wrap_iv)?;
    let (new_meta_iv, new_meta_ct) = envelope::seal_bytes(new, &meta_plain)?;

    let mut encrypted_metadata = Vec::with_capacity(NONCE_LEN + new_meta_ct.len());
    encrypted_metadata.extend_from_slice(&new_meta_iv);
    encrypted_metadata.extend_from_slice(&new_meta_ct);

    let new_header = FileHeader {
        version: old_header.version,
        wrap_iv: old_header.wrap_iv,
        wrapped_fek: rewrapped
            .ciphertext
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("bad wrapped key length".into()))?,
        encrypted_metadata,
    };

    // Fast path requires verified byte-count equality, not an assumption.
    if new_header.serialized_len() == old_header.serialized_len() {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(&new_header.to_bytes())?;
        file.sync_all()?;
        Ok(RewrapOutcome::Rewrapped)
    } else {
        rewrap_via_copy(path, old_header.serialized_len() as u64, &new_header)?;
        Ok(RewrapOutcome::Rewrapped)
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}"))
}

fn rewrap_via_copy(path: &Path, old_header_len: u64, new_header: &FileHeader) -> VaultResult<()> {
    let tmp = sibling_path(path, "tmp");
    let stale = sibling_path(path, "stale");

    {
        let mut src = File::open(path)?;
        src.seek(SeekFrom::Start(old_header_len))?;

        let mut out = BufWriter::new(File::create(&tmp)?);
        out.write_all(&new_header.to_bytes())?;
        io::copy(&mut src, &mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
    }

    fs::rename(path, &stale)?;
    fs::rename(&tmp, path)?;

    // The superseded file holds ciphertext only; a single random pass
    // before deletion is enough.
    secure_erase(&stale, 1)
}

// ---------------------------------------------------------------------------
// Secure erase
// ---------------------------------------------------------------------------

/// Overwrite a file with cryptographically random bytes for `passes`
/// iterations, flushing durably after each pass, then delete it.
///
/// Best-effort on flash media; used on plaintext sources after encryption
/// and on superseded containers after a slow rewrap.
pub fn secure_erase(path: &Path, passes: u32) -> VaultResult<()> {
    if !path.exists() {
        return Ok(());
    }

    let len = fs::metadata(path)?.len();
    if len > 0 {
        let mut file = OpenOptions::new().write(true).open(path)?;
        for _ in 0..passes.max(1) {
            overwrite_with_random(&mut file, len)?;
        }
    }

    fs::remove_file(path)?;
    Ok(())
}

fn overwrite_with_random(file: &mut File, len: u64) -> VaultResult<()> {
    let mut rng = rand::thread_rng();
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut remaining = len;

    file.seek(SeekFrom::Start(0))?;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        rng.fill_bytes(&mut chunk[..n]);
        file.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn codec(master: &Arc<MasterKey>) -> FileVaultCodec {
        FileVaultCodec::new(Arc::clone(master))
    }

    fn sample_meta() -> FileMetadata {
        FileMetadata {
            original_name: "IMG_0001.jpg".into(),
            mime_type: "image/jpeg".into(),
            created_at: Utc::now(),
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_roundtrip_chunk_boundaries() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();

        for len in [0usize, 1, 8191, 8192, 8193] {
            let plain = pattern(len);
            let dest = dir.path().join(format!("file_{len}.enc"));

            codec(&master)
                .encrypt(&mut Cursor::new(&plain), &dest, &sample_meta())
                .unwrap();

            let mut out = Vec::new();
            codec(&master)
                .open(&dest)
                .unwrap()
                .read_to_end(&mut out)
                .unwrap();

            assert_eq!(out, plain, "roundtrip failed for {len} bytes");
        }
    }

    #[test]
    fn test_roundtrip_multi_mb() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let plain = pattern(3 * 1024 * 1024 + 17);
        let dest = dir.path().join("large.enc");

        let written = codec(&master)
            .encrypt(&mut Cursor::new(&plain), &dest, &sample_meta())
            .unwrap();
        assert_eq!(written, plain.len() as u64);

        let mut out = Vec::new();
        codec(&master)
            .open(&dest)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let plain = pattern(4096);
        let dest = dir.path().join("file.enc");

        codec(&master)
            .encrypt(&mut Cursor::new(&plain), &dest, &sample_meta())
            .unwrap();

        let raw = fs::read(&dest).unwrap();
        let body = &raw[raw.len() - plain.len()..];
        assert_ne!(body, plain.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let mk1 = Arc::new(MasterKey::generate());
        let mk2 = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");

        codec(&mk1)
            .encrypt(&mut Cursor::new(b"secret".to_vec()), &dest, &sample_meta())
            .unwrap();

        assert!(matches!(
            codec(&mk2).open(&dest),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");
        let meta = sample_meta();

        codec(&master)
            .encrypt(&mut Cursor::new(b"data".to_vec()), &dest, &meta)
            .unwrap();

        let read_back = codec(&master).read_metadata(&dest).unwrap();
        assert_eq!(read_back.original_name, meta.original_name);
        assert_eq!(read_back.mime_type, meta.mime_type);

        let stream = codec(&master).open(&dest).unwrap();
        assert_eq!(stream.metadata().original_name, meta.original_name);
    }

    #[test]
    fn test_rewrap_flips_keys_in_place() {
        let mk1 = Arc::new(MasterKey::generate());
        let mk2 = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");
        let plain = pattern(20_000);

        codec(&mk1)
            .encrypt(&mut Cursor::new(&plain), &dest, &sample_meta())
            .unwrap();
        let size_before = fs::metadata(&dest).unwrap().len();

        let outcome = rewrap_header(&dest, &mk1, &mk2).unwrap();
        assert_eq!(outcome, RewrapOutcome::Rewrapped);

        // Metadata plaintext length is unchanged, so the in-place fast
        // path applies and the file size must not move.
        assert_eq!(fs::metadata(&dest).unwrap().len(), size_before);

        let mut out = Vec::new();
        codec(&mk2)
            .open(&dest)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, plain);

        assert!(matches!(
            codec(&mk1).open(&dest),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_rewrap_idempotent() {
        let mk1 = Arc::new(MasterKey::generate());
        let mk2 = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");

        codec(&mk1)
            .encrypt(&mut Cursor::new(b"payload".to_vec()), &dest, &sample_meta())
            .unwrap();

        assert_eq!(
            rewrap_header(&dest, &mk1, &mk2).unwrap(),
            RewrapOutcome::Rewrapped
        );
        assert_eq!(
            rewrap_header(&dest, &mk1, &mk2).unwrap(),
            RewrapOutcome::AlreadyCurrent
        );

        let mut out = Vec::new();
        codec(&mk2)
            .open(&dest)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_rewrap_with_unrelated_key_fails() {
        let mk1 = Arc::new(MasterKey::generate());
        let mk2 = Arc::new(MasterKey::generate());
        let mk3 = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");

        codec(&mk1)
            .encrypt(&mut Cursor::new(b"payload".to_vec()), &dest, &sample_meta())
            .unwrap();

        assert!(matches!(
            rewrap_header(&dest, &mk2, &mk3),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_secure_erase_overwrites_then_deletes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.bin");
        let original = pattern(10_000);
        fs::write(&path, &original).unwrap();

        // Each overwrite pass must leave content different from the
        // original plaintext.
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            overwrite_with_random(&mut file, original.len() as u64).unwrap();
        }
        let after_pass = fs::read(&path).unwrap();
        assert_eq!(after_pass.len(), original.len());
        assert_ne!(after_pass, original);

        secure_erase(&path, 3).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_secure_erase_missing_file_ok() {
        let dir = tempdir().unwrap();
        assert!(secure_erase(&dir.path().join("absent.bin"), 3).is_ok());
    }

    #[test]
    fn test_truncated_container_rejected() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");

        codec(&master)
            .encrypt(&mut Cursor::new(b"data".to_vec()), &dest, &sample_meta())
            .unwrap();

        let raw = fs::read(&dest).unwrap();
        fs::write(&dest, &raw[..30]).unwrap();

        assert!(matches!(
            codec(&master).open(&dest),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("file.enc");

        codec(&master)
            .encrypt(&mut Cursor::new(b"data".to_vec()), &dest, &sample_meta())
            .unwrap();

        let mut raw = fs::read(&dest).unwrap();
        raw[0] = 0x7F;
        fs::write(&dest, &raw).unwrap();

        assert!(matches!(
            codec(&master).open(&dest),
            Err(VaultError::UnsupportedVersion(0x7F))
        ));
    }

    #[test]
    fn test_partial_output_deleted_on_failure() {
        struct FailingReader {
            served: usize,
        }

        impl Read for FailingReader {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.served == 0 {
                    self.served = 1;
                    buf[..100].fill(0xAB);
                    Ok(100)
                } else {
                    Err(io::Error::new(io::ErrorKind::Other, "source vanished"))
                }
            }
        }

        let master = Arc::new(MasterKey::generate());
        let dir = tempdir().unwrap();
        let dest = dir.path().join("partial.enc");

        let result = codec(&master).encrypt(
            &mut FailingReader { served: 0 },
            &dest,
            &sample_meta(),
        );

        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(
            detect_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
        assert_eq!(detect_mime(b"random data"), "application/octet-stream");
        assert_eq!(detect_mime(&[]), "application/octet-stream");
    }
}
