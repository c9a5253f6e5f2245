//! Engine Snapshots
//!
//! Complete serializable engine + rules state. Used for durable
//! persistence, for disposable engine copies (AI sandbox, verification)
//! and for resuming a live match after a restart.
//!
//! ```text
//! ┌──────────────────────── Snapshot ────────────────────────┐
//! │ version │ seed │ rngState │ table │ balls[16] │ rules    │
//! └──────────────────────────────────────────────────────────┘
//!        JSON (camelCase) for session rows, bincode for bytes
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::{compute_state_hash, to_hex, StateHash};
use crate::core::rng::DeterministicRng;
use crate::game::state::{BallSet, RulesPhase, RulesState};
use crate::game::table::TableConfig;

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A snapshot failed validation or decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// Written by an incompatible version
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version this build reads
        expected: u32,
        /// Version found in the snapshot
        found: u32,
    },

    /// Ball array is not sixteen balls indexed by id
    #[error("ball array is malformed")]
    MalformedBalls,

    /// Cue ball missing from the table
    #[error("cue ball is not on the table")]
    MissingCueBall,

    /// An active ball sits outside the rails
    #[error("ball {0} is outside the table")]
    BallOutOfRange(u8),

    /// A ball is still moving
    #[error("ball {0} is moving in a resting snapshot")]
    BallMoving(u8),

    /// All-zero generator state
    #[error("rng state is invalid")]
    InvalidRngState,

    /// Table fields do not match the ones derived from its scale
    #[error("table does not match adjustment scale {0}")]
    TableMismatch(f64),

    /// Rules state contradicts itself
    #[error("rules state is invalid: {0}")]
    InvalidRules(&'static str),

    /// bincode failure
    #[error("snapshot encoding failed: {0}")]
    Encoding(String),
}

/// Serialized engine + rules state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Layout version
    pub version: u32,
    /// Match seed (never changes mid-match)
    pub seed: u64,
    /// Generator state after the last draw
    pub rng_state: [u64; 2],
    /// Table configuration
    pub table: TableConfig,
    /// All sixteen balls
    pub balls: BallSet,
    /// Rules state
    pub rules: RulesState,
}

impl Snapshot {
    /// Check every structural invariant.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            });
        }

        if DeterministicRng::from_state(self.rng_state).is_none() {
            return Err(SnapshotError::InvalidRngState);
        }

        let scale = self.table.adjustment_scale;
        match TableConfig::from_scale(scale) {
            Ok(expected) if expected == self.table => {}
            _ => return Err(SnapshotError::TableMismatch(scale)),
        }

        if !self.balls.is_well_formed() {
            return Err(SnapshotError::MalformedBalls);
        }
        if !self.balls.cue().map_or(false, |cue| cue.active) {
            return Err(SnapshotError::MissingCueBall);
        }
        for ball in self.balls.iter().filter(|b| b.active) {
            if !self.table.contains_ball(ball.position) {
                return Err(SnapshotError::BallOutOfRange(ball.id));
            }
            if ball.is_moving() {
                return Err(SnapshotError::BallMoving(ball.id));
            }
        }

        let rules = &self.rules;
        match rules.phase {
            RulesPhase::Evaluating => return Err(SnapshotError::InvalidRules("captured mid-shot")),
            RulesPhase::GameOver if rules.winner.is_none() => {
                return Err(SnapshotError::InvalidRules("game over without a winner"))
            }
            RulesPhase::AwaitingShot if rules.winner.is_some() => {
                return Err(SnapshotError::InvalidRules("winner set while still playing"))
            }
            _ => {}
        }
        if rules.group_of(rules.turn.opponent()) != rules.group_of(rules.turn).complement() {
            return Err(SnapshotError::InvalidRules("groups are not complementary"));
        }
        Ok(())
    }

    /// SHA-256 over every field in a fixed order.
    pub fn state_hash(&self) -> StateHash {
        hash_state(self.seed, self.rng_state, &self.table, &self.balls, &self.rules)
    }

    /// Hex form of [`Snapshot::state_hash`].
    pub fn state_hash_hex(&self) -> String {
        to_hex(&self.state_hash())
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Decode and validate a binary snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot =
            bincode::deserialize(bytes).map_err(|e| SnapshotError::Encoding(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Hash engine state without building a snapshot.
pub(crate) fn hash_state(
    seed: u64,
    rng_state: [u64; 2],
    table: &TableConfig,
    balls: &BallSet,
    rules: &RulesState,
) -> StateHash {
    compute_state_hash(rules.shot_number, seed, |hasher| {
        hasher.update_u32(SNAPSHOT_VERSION);
        hasher.update_u64(rng_state[0]);
        hasher.update_u64(rng_state[1]);
        table.hash_into(hasher);
        balls.hash_into(hasher);
        rules.hash_into(hasher);
    })
}

// =============================================================================
// TESTS
// =============================================================================
