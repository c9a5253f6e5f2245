//! State hashing
//!
//! A snapshot hash is SHA-256 over a domain tag followed by the shot
//! number, the seed and then the table, balls and rules in a fixed order.
//! Shot results carry it as lowercase hex, and replay verification compares
//! the replayed hash against the live one.
//!
//! Every multi-byte value is written little-endian. Variable-length values
//! carry a `u32` length prefix so adjacent fields cannot run together.

use sha2::{Digest, Sha256};

use super::fixed::Fixed;
use super::vec2::FixedVec2;

/// 32-byte SHA-256 digest.
pub type StateHash = [u8; 32];

/// Domain tag prepended to every snapshot hash.
pub const SNAPSHOT_DOMAIN: &[u8] = b"BREAKSHOT_STATE_V1";

/// Incremental hasher for engine state. Callers must feed fields in the
/// same order on every run.
pub struct StateHasher {
    digest: Sha256,
}

impl StateHasher {
    /// Start a hash under `domain`.
    pub fn new(domain: &[u8]) -> Self {
        let mut digest = Sha256::new();
        digest.update(domain);
        Self { digest }
    }

    /// Start a snapshot hash.
    pub fn for_snapshot() -> Self {
        Self::new(SNAPSHOT_DOMAIN)
    }

    /// Length-prefixed byte string.
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.update_u32(bytes.len() as u32);
        self.digest.update(bytes);
    }

    /// Length-prefixed UTF-8 text.
    pub fn update_str(&mut self, value: &str) {
        self.update_bytes(value.as_bytes());
    }

    /// Single byte.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.digest.update([value]);
    }

    /// `0` or `1`.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(u8::from(value));
    }

    /// Little-endian `u32`.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.digest.update(value.to_le_bytes());
    }

    /// Little-endian `u64`.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.digest.update(value.to_le_bytes());
    }

    /// Raw Q48.16 bits.
    #[inline]
    pub fn update_fixed(&mut self, value: Fixed) {
        self.digest.update(value.to_le_bytes());
    }

    /// `x` then `y`.
    #[inline]
    pub fn update_vec2(&mut self, value: FixedVec2) {
        self.update_fixed(value.x);
        self.update_fixed(value.y);
    }

    /// Consume the hasher.
    pub fn finalize(self) -> StateHash {
        self.digest.finalize().into()
    }
}

/// Snapshot hash: shot number and seed first, then whatever `write_state`
/// appends.
pub fn compute_state_hash<F>(shot_number: u32, seed: u64, write_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_snapshot();
    hasher.update_u32(shot_number);
    hasher.update_u64(seed);
    write_state(&mut hasher);
    hasher.finalize()
}

/// Lowercase hex, as carried in shot results and match records.
pub fn to_hex(hash: &StateHash) -> String {
    hex::encode(hash)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::FIXED_ONE;

    fn table_hash(shot: u32, cue: FixedVec2, on_table: bool) -> StateHash {
        compute_state_hash(shot, 99, |h| {
            h.update_u8(0);
            h.update_vec2(cue);
            h.update_bool(on_table);
            h.update_str("p1");
        })
    }

    #[test]
    fn test_hash_is_stable() {
        let cue = FixedVec2::from_ints(150, 150);
        assert_eq!(table_hash(4, cue, true), table_hash(4, cue, true));
    }

    #[test]
    fn test_any_field_change_moves_hash() {
        let cue = FixedVec2::from_ints(150, 150);
        let base = table_hash(4, cue, true);
        assert_ne!(base, table_hash(5, cue, true));
        assert_ne!(base, table_hash(4, FixedVec2::new(cue.x + 1, cue.y), true));
        assert_ne!(base, table_hash(4, cue, false));
    }

    #[test]
    fn test_field_order_matters() {
        let mut a = StateHasher::for_snapshot();
        a.update_fixed(FIXED_ONE);
        a.update_fixed(2 * FIXED_ONE);
        let mut b = StateHasher::for_snapshot();
        b.update_fixed(2 * FIXED_ONE);
        b.update_fixed(FIXED_ONE);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_length_prefix_separates_strings() {
        let split = |x: &str, y: &str| {
            let mut h = StateHasher::new(b"t");
            h.update_str(x);
            h.update_str(y);
            h.finalize()
        };
        assert_ne!(split("solid", "s"), split("solids", ""));
    }

    #[test]
    fn test_domain_separates_hashes() {
        let mut a = StateHasher::new(b"A");
        let mut b = StateHasher::new(b"B");
        a.update_u64(7);
        b.update_u64(7);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_hex_encoding() {
        let hex = to_hex(&[0x0fu8; 32]);
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c == '0' || c == 'f'));
        assert!(hex.starts_with("0f0f"));
    }
}
