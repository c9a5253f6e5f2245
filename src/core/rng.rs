//! Seeded randomness
//!
//! Every random decision in a match (rack jitter, AI candidate sampling,
//! think delays) is drawn from a [`DeterministicRng`] seeded from the match
//! seed. The generator is Xorshift128+ with a SplitMix64 seed expansion, so
//! a seed maps to the same sequence on every platform.
//!
//! ```text
//!   match seed ──► DeterministicRng (engine, rack + nothing else)
//!        │
//!        └──► derive_stream_seed(purpose, shot, side) ──► side streams
//!                                                       (ai, think)
//! ```
//!
//! Side streams never advance the engine generator, so running the AI or
//! sampling a delay cannot change what a replay sees.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::fixed::{Fixed, FIXED_ONE};
use super::vec2::FixedVec2;

const MATCH_SEED_DOMAIN: &[u8] = b"BREAKSHOT_SEED_V1";
const STREAM_SEED_DOMAIN: &[u8] = b"BREAKSHOT_STREAM_V1";

/// Xorshift128+ generator with a serializable state.
///
/// ```
/// use breakshot::core::rng::DeterministicRng;
///
/// let mut rack = DeterministicRng::new(7);
/// let mut replayed = DeterministicRng::new(7);
/// assert_eq!(rack.next_u64(), replayed.next_u64());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed a generator. The two state words come from SplitMix64.
    pub fn new(seed: u64) -> Self {
        let mut cursor = seed;
        let lo = splitmix64(&mut cursor);
        let hi = splitmix64(&mut cursor);
        match [lo, hi] {
            [0, 0] => Self { state: [1, 1] },
            state => Self { state },
        }
    }

    /// Restore a generator from [`state`](Self::state). `None` for the
    /// all-zero state, which never advances.
    pub fn from_state(state: [u64; 2]) -> Option<Self> {
        (state != [0, 0]).then_some(Self { state })
    }

    /// Raw state words, stored in snapshots.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Next raw 64-bit output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, mut b] = self.state;
        let out = a.wrapping_add(b);
        b ^= a;
        self.state = [a.rotate_left(24) ^ b ^ (b << 16), b.rotate_left(37)];
        out
    }

    /// Uniform integer in `[min, max]`, inclusive. Returns `min` when the
    /// range is empty or a single value.
    #[inline]
    pub fn next_int_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        match (max - min).checked_add(1) {
            Some(span) => min + self.next_u64() % span,
            None => self.next_u64(),
        }
    }

    /// Fixed-point value in `[0, max)`; zero for a non-positive `max`.
    #[inline]
    pub fn next_fixed(&mut self, max: Fixed) -> Fixed {
        if max <= 0 {
            return 0;
        }
        // top 32 bits as a fraction of 2^32
        let frac = (self.next_u64() >> 32) as i128;
        ((frac * max as i128) >> 32) as Fixed
    }

    /// Fixed-point value in `[min, max)`.
    #[inline]
    pub fn next_fixed_range(&mut self, min: Fixed, max: Fixed) -> Fixed {
        if min >= max {
            min
        } else {
            min + self.next_fixed(max - min)
        }
    }

    /// Fixed-point value in `[-1, 1)`.
    #[inline]
    pub fn next_signed_unit(&mut self) -> Fixed {
        self.next_fixed_range(-FIXED_ONE, FIXED_ONE)
    }

    /// Unit aim direction. Samples inside the unit square and rejects
    /// vectors too short to normalize reliably.
    pub fn random_direction(&mut self) -> FixedVec2 {
        let min_len_sq = FIXED_ONE / 64;
        loop {
            let v = FixedVec2::new(self.next_signed_unit(), self.next_signed_unit());
            if v.length_squared() > min_len_sq {
                return v.normalize();
            }
        }
    }
}

#[inline]
fn splitmix64(cursor: &mut u64) -> u64 {
    *cursor = cursor.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *cursor;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn leading_u64(digest: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word)
}

/// Seed for a session that did not supply one.
///
/// Hashes the match id and the seat ids in seat order (p1, p2), so
/// swapping seats yields a different rack.
pub fn derive_match_seed(match_id: &[u8; 16], seat_ids: &[&str]) -> u64 {
    let mut digest = Sha256::new();
    digest.update(MATCH_SEED_DOMAIN);
    digest.update(match_id);
    for seat in seat_ids {
        digest.update((seat.len() as u32).to_le_bytes());
        digest.update(seat.as_bytes());
    }
    leading_u64(&digest.finalize())
}

/// Seed for a side stream of a match.
///
/// `purpose` names the consumer (`b"ai"`, `b"think"`), `counter` is
/// normally the shot number and `tag` the acting side.
pub fn derive_stream_seed(match_seed: u64, purpose: &[u8], counter: u32, tag: u8) -> u64 {
    let mut digest = Sha256::new();
    digest.update(STREAM_SEED_DOMAIN);
    digest.update(purpose);
    digest.update(match_seed.to_le_bytes());
    digest.update(counter.to_le_bytes());
    digest.update([tag]);
    leading_u64(&digest.finalize())
}

// =============================================================================
// TESTS
// =============================================================================
