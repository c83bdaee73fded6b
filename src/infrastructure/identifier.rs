use crate::constants::{BASE91_ALPHABET, DEDUP_KEY_SEPARATOR};
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Row key source for notes and cards.
///
/// Seeded from wall-clock milliseconds so ids are unique within a build and
/// roughly time-ordered across builds. Each package build owns its own
/// generator; nothing here is shared process-wide.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::with_seed(Utc::now().timestamp_millis())
    }

    pub fn with_seed(seed: i64) -> Self {
        Self { next: seed }
    }

    /// Returns the current value, then advances the counter
    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns the value the next call to `next_id` will hand out
    pub fn peek(&self) -> i64 {
        self.next
    }

    /// Uniform draw from [2^30, 2^31), used for deck and model ids the
    /// caller did not supply.
    pub fn random_large_id(&self) -> i64 {
        rand::rng().random_range(1_i64 << 30..1_i64 << 31)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Content-derived note guid, bit-compatible with Anki's `guid_for`.
///
/// SHA-256 over the `__`-joined field values, first 8 bytes read big-endian,
/// rendered in base 91.
pub fn derive_dedup_key<S: AsRef<str>>(fields: &[S]) -> String {
    let joined = fields
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<_>>()
        .join(DEDUP_KEY_SEPARATOR);

    let digest = Sha256::digest(joined.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);

    base91(u64::from_be_bytes(head))
}

/// Most-significant digit first, no padding.
pub fn base91(mut num: u64) -> String {
    let table = BASE91_ALPHABET.as_bytes();
    let radix = table.len() as u64;

    if num == 0 {
        return (table[0] as char).to_string();
    }

    let mut digits = Vec::new();
    while num > 0 {
        digits.push(table[(num % radix) as usize]);
        num /= radix;
    }
    digits.reverse();

    // alphabet is pure ASCII
    String::from_utf8(digits).unwrap_or_default()
}
