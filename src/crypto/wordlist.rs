//! MediaVault - Recovery Wordlist
//!
//! The 2048-word recovery wordlist is embedded at compile time and parsed
//! once on first access. 2048 entries give 11 bits per word.

use std::sync::OnceLock;

/// Number of words in the embedded wordlist
pub const WORDLIST_SIZE: usize = 2048;

/// Bits encoded by a single word
pub const BITS_PER_WORD: usize = 11;

const ENGLISH_RAW: &str = include_str!("wordlist/english.txt");

static ENGLISH_LOCK: OnceLock<Box<[&'static str]>> = OnceLock::new();

/// Returns the parsed wordlist, sorted ascending.
pub fn wordlist() -> &'static [&'static str] {
    ENGLISH_LOCK.get_or_init(|| {
        let words: Vec<&'static str> = ENGLISH_RAW.lines().collect();
        assert_eq!(
            words.len(),
            WORDLIST_SIZE,
            "embedded wordlist must contain exactly {WORDLIST_SIZE} words"
        );
        words.into_boxed_slice()
    })
}

/// 0-based index of `word`, or `None` when it is not in the list.
///
/// The list is byte-order sorted, so binary search applies.
pub fn word_index(word: &str) -> Option<u16> {
    wordlist()
        .binary_search_by(|probe| (**probe).cmp(word))
        .ok()
        .map(|i| i as u16)
}

/// Word at `index`. Panics when `index >= WORDLIST_SIZE`.
pub fn word_at(index: u16) -> &'static str {
    wordlist()[index as usize]
}
