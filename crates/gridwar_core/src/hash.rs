//! Stable hashing for determinism checks and seeded jitter.
//!
//! `std`'s `DefaultHasher` is not guaranteed to produce the same output
//! across Rust releases, so anything that must match between builds or
//! machines goes through [`StableHasher`] instead.

use std::hash::Hasher;

/// 64-bit FNV-1a.
#[derive(Debug, Clone, Copy)]
pub struct StableHasher {
    state: u64,
}

impl StableHasher {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Fresh hasher at the FNV offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }

    /// Feed a `u64` in little-endian order, independent of the host.
    pub fn write_le_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// FNV-1a of a byte slice.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hasher = StableHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_le_words_match_bytes() {
        let mut hasher = StableHasher::new();
        hasher.write_le_u64(0x0102_0304_0506_0708);
        assert_eq!(hasher.finish(), fnv1a(&[8, 7, 6, 5, 4, 3, 2, 1]));
    }
}
