//! MediaVault - Recovery Phrase
//!
//! 12-word mnemonic encoding 128 bits of entropy plus a 4-bit SHA-256
//! checksum, 11 bits per word over the embedded wordlist. Generated once at
//! setup and immutable thereafter; a password change never changes it.

use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::wordlist::{word_at, word_index, BITS_PER_WORD};
use crate::error::{VaultError, VaultResult};

/// Words in a recovery phrase
pub const PHRASE_WORDS: usize = 12;

/// Entropy bytes encoded by a phrase
pub const ENTROPY_LEN: usize = 16;

const ENTROPY_BITS: usize = ENTROPY_LEN * 8;
const CHECKSUM_BITS: usize = 4;
const TOTAL_BITS: usize = ENTROPY_BITS + CHECKSUM_BITS;

/// A validated 12-word recovery phrase.
///
/// Acts as deterministic salt material for master-key derivation. The
/// backing entropy is zeroized on drop.
pub struct RecoveryPhrase {
    entropy: [u8; ENTROPY_LEN],
}

impl RecoveryPhrase {
    /// Generate a fresh phrase from 128 bits of CSPRNG entropy
    pub fn generate() -> Self {
        let mut entropy = [0u8; ENTROPY_LEN];
        rand::thread_rng().fill_bytes(&mut entropy);
        Self { entropy }
    }

    /// Build a phrase from fixed entropy
    pub fn from_entropy(entropy: [u8; ENTROPY_LEN]) -> Self {
        Self { entropy }
    }

    /// Parse and validate a phrase string.
    ///
    /// Requires exactly 12 known words with a matching checksum; fails
    /// closed on any other word count.
    pub fn parse(input: &str) -> VaultResult<Self> {
        let words: Vec<&str> = input.split_whitespace().collect();
        if words.len() != PHRASE_WORDS {
            return Err(VaultError::InvalidCredential(format!(
                "recovery phrase must contain exactly {PHRASE_WORDS} words, got {}",
                words.len()
            )));
        }

        let mut indices = [0u16; PHRASE_WORDS];
        for (i, word) in words.iter().enumerate() {
            indices[i] = word_index(word).ok_or_else(|| {
                VaultError::InvalidCredential(format!("unknown word at position {}", i + 1))
            })?;
        }

        let (entropy, provided_checksum) = unpack_indices(&indices);
        if provided_checksum != checksum_bits(&entropy) {
            return Err(VaultError::InvalidCredential(
                "recovery phrase checksum mismatch".into(),
            ));
        }

        Ok(Self { entropy })
    }

    /// Check a phrase string without constructing it
    pub fn validate(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// The 12 words of this phrase
    pub fn words(&self) -> [&'static str; PHRASE_WORDS] {
        let indices = pack_entropy(&self.entropy);
        let mut words = [""; PHRASE_WORDS];
        for (i, idx) in indices.iter().enumerate() {
            words[i] = word_at(*idx);
        }
        words
    }

    /// Words joined by single spaces, in a zeroizing buffer.
    ///
    /// This exact string is the salt material for master-key derivation.
    pub fn join_words(&self) -> Zeroizing<String> {
        Zeroizing::new(self.words().join(" "))
    }
}

impl Drop for RecoveryPhrase {
    fn drop(&mut self) {
        self.entropy.zeroize();
    }
}

impl Clone for RecoveryPhrase {
    fn clone(&self) -> Self {
        Self {
            entropy: self.entropy,
        }
    }
}

/// First 4 bits of SHA-256 over the entropy, right-aligned in a u8
fn checksum_bits(entropy: &[u8; ENTROPY_LEN]) -> u8 {
    let digest = Sha256::digest(entropy);
    digest[0] >> 4
}

/// Bit `pos` of the 132-bit stream `entropy || checksum`
fn stream_bit(entropy: &[u8; ENTROPY_LEN], checksum: u8, pos: usize) -> u16 {
    debug_assert!(pos < TOTAL_BITS);
    if pos < ENTROPY_BITS {
        u16::from((entropy[pos / 8] >> (7 - pos % 8)) & 1)
    } else {
        u16::from((checksum >> (CHECKSUM_BITS - 1 - (pos - ENTROPY_BITS))) & 1)
    }
}

/// Encode entropy + checksum into twelve 11-bit word indices
fn pack_entropy(entropy: &[u8; ENTROPY_LEN]) -> [u16; PHRASE_WORDS] {
    let checksum = checksum_bits(entropy);
    let mut indices = [0u16; PHRASE_WORDS];
    for (word, index) in indices.iter_mut().enumerate() {
        for bit in 0..BITS_PER_WORD {
            *index = (*index << 1) | stream_bit(entropy, checksum, word * BITS_PER_WORD + bit);
        }
    }
    indices
}

/// Decode twelve word indices back into entropy and the carried checksum
fn unpack_indices(indices: &[u16; PHRASE_WORDS]) -> ([u8; ENTROPY_LEN], u8) {
    let mut entropy = [0u8; ENTROPY_LEN];
    let mut checksum = 0u8;

    for (word, index) in indices.iter().enumerate() {
        for bit in 0..BITS_PER_WORD {
            let pos = word * BITS_PER_WORD + bit;
            let value = (index >> (BITS_PER_WORD - 1 - bit)) & 1;
            if pos < ENTROPY_BITS {
                entropy[pos / 8] |= (value as u8) << (7 - pos % 8);
            } else {
                checksum |= (value as u8) << (CHECKSUM_BITS - 1 - (pos - ENTROPY_BITS));
            }
        }
    }

    (entropy, checksum)
}
