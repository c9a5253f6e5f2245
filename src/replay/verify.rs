//! Replay Verification
//!
//! Rebuild a match from its seed and shot log, then compare the outcome
//! with what a client claims. The replay is authoritative.
//!
//! ```text
//!   shot log ──order──► fresh Engine(seed, scale) ──apply each──► final rules
//!                                │                                    │
//!                                └─ first rejected entry ─► ReplayDivergence
//!                                                                     ▼
//!                                        claim ──compare──► Verification
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::game::engine::{Engine, EngineError};
use crate::game::input::ValidationError;
use crate::game::state::{RulesState, Side};
use crate::game::table::TableError;
use crate::replay::metadata::MatchMetadata;
use crate::replay::shot_log::{order_shot_log, ShotLogEntry};

// =============================================================================
// ERRORS
// =============================================================================

/// Why a logged shot could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DivergenceReason {
    /// The table could not be built from the recorded scale
    #[error(transparent)]
    Table(#[from] TableError),

    /// The engine rejected the shot (wrong turn, malformed, illegal placement)
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    /// The engine hit an internal consistency failure
    #[error("{0}")]
    Internal(String),
}

impl From<EngineError> for DivergenceReason {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => DivergenceReason::Rejected(e),
            EngineError::Internal(msg) => DivergenceReason::Internal(msg),
        }
    }
}

/// A shot log that does not replay.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("replay diverged at entry {index} (seq {seq}): {reason}")]
pub struct ReplayDivergence {
    /// Position in replay order
    pub index: usize,
    /// Sequence number of the entry (0 when unknown or before any entry)
    pub seq: u64,
    /// Side recorded on the entry
    pub side: Option<Side>,
    /// What went wrong
    pub reason: DivergenceReason,
}

impl ReplayDivergence {
    fn at(index: usize, entry: &ShotLogEntry, reason: impl Into<DivergenceReason>) -> Self {
        Self {
            index,
            seq: entry.seq,
            side: Some(entry.actor_side),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// REPLAY
// =============================================================================

/// Result of a complete replay.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    /// Engine after the last entry
    pub engine: Engine,
    /// Entries applied
    pub shots_applied: usize,
    /// State hash after each entry
    pub shot_hashes: Vec<String>,
}

impl ReplayOutcome {
    /// Final rules state.
    pub fn rules(&self) -> &RulesState {
        self.engine.rules()
    }

    /// Final state hash (hex).
    pub fn final_hash(&self) -> String {
        crate::core::hash::to_hex(&self.engine.state_hash())
    }
}

/// Replay a shot log from scratch with capture disabled.
pub fn replay(
    shot_log: &[ShotLogEntry],
    seed: u64,
    adjustment_scale: f64,
) -> Result<ReplayOutcome, ReplayDivergence> {
    let mut engine = Engine::new(seed, adjustment_scale).map_err(|e| ReplayDivergence {
        index: 0,
        seq: 0,
        side: None,
        reason: e.into(),
    })?;

    let ordered = order_shot_log(shot_log);
    let mut shot_hashes = Vec::with_capacity(ordered.len());

    for (index, entry) in ordered.iter().enumerate() {
        let input = entry
            .to_input(engine.table().max_power)
            .map_err(|e| ReplayDivergence::at(index, entry, e))?;
        let result = engine
            .apply_shot(entry.actor_side, &input, None)
            .map_err(|e| ReplayDivergence::at(index, entry, e))?;
        shot_hashes.push(result.state_hash);
    }

    Ok(ReplayOutcome {
        engine,
        shots_applied: ordered.len(),
        shot_hashes,
    })
}

// =============================================================================
// CLAIMS
// =============================================================================

/// Result a client submits at the end of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedResult {
    /// Claimed p1 score
    pub p1_score: u32,
    /// Claimed p2 score
    pub p2_score: u32,
    /// Claimed winner
    pub winner: Option<Side>,
}

/// Claimed field that disagreed with the replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClaimField {
    /// p1 score
    P1Score,
    /// p2 score
    P2Score,
    /// Winner
    Winner,
}

/// Authoritative values from a replay plus the comparison with the claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// Replayed p1 score
    pub p1_score: u32,
    /// Replayed p2 score
    pub p2_score: u32,
    /// Replayed winner
    pub winner: Option<Side>,
    /// Fields where the claim differs
    pub mismatches: Vec<ClaimField>,
    /// Entries replayed
    pub shots: usize,
    /// Final state hash (hex)
    pub state_hash: String,
}

impl Verification {
    /// Whether the claim matches the replay exactly.
    pub fn matches_claim(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Replay a match and compare the outcome with a claim.
///
/// The returned scores and winner always come from the replay.
pub fn verify_claim(
    metadata: &MatchMetadata,
    claim: &ClaimedResult,
) -> Result<Verification, ReplayDivergence> {
    let outcome = replay(&metadata.shot_log, metadata.match_seed, metadata.adjustment_scale)
        .map_err(|divergence| {
            warn!(%divergence, "Claim could not be verified");
            divergence
        })?;

    let rules = outcome.rules();
    let mut mismatches = Vec::new();
    if claim.p1_score != rules.p1_score {
        mismatches.push(ClaimField::P1Score);
    }
    if claim.p2_score != rules.p2_score {
        mismatches.push(ClaimField::P2Score);
    }
    if claim.winner != rules.winner {
        mismatches.push(ClaimField::Winner);
    }

    let verification = Verification {
        p1_score: rules.p1_score,
        p2_score: rules.p2_score,
        winner: rules.winner,
        mismatches,
        shots: outcome.shots_applied,
        state_hash: outcome.final_hash(),
    };

    info!(
        shots = verification.shots,
        matches = verification.matches_claim(),
        "Claim verified by replay"
    );

    Ok(verification)
}

// =============================================================================
// COMPLETION
// =============================================================================

/// Why a match is being completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionReason {
    /// The rules decided the game
    Normal,
    /// The duration budget ran out
    Timeout,
    /// A side resigned
    Forfeit {
        /// Side that resigned
        side: Side,
    },
}

/// How a completed match resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    /// A side won
    Winner {
        /// Winning side
        side: Side,
    },
    /// Level scores on a timeout
    Draw,
    /// No winner and a draw is not allowed for this reason
    Unresolved,
}

/// Resolve a completed match.
///
/// A decided game keeps its winner. Otherwise a forfeit goes to the
/// opponent and everything else is decided on score; level scores are a
/// draw only on timeout.
pub fn resolve_completion(rules: &RulesState, reason: CompletionReason) -> Resolution {
    if let Some(side) = rules.winner {
        return Resolution::Winner { side };
    }
    if let CompletionReason::Forfeit { side } = reason {
        return Resolution::Winner { side: side.opponent() };
    }
    match rules.p1_score.cmp(&rules.p2_score) {
        std::cmp::Ordering::Greater => Resolution::Winner { side: Side::P1 },
        std::cmp::Ordering::Less => Resolution::Winner { side: Side::P2 },
        std::cmp::Ordering::Equal if reason == CompletionReason::Timeout => Resolution::Draw,
        std::cmp::Ordering::Equal => Resolution::Unresolved,
    }
}

// =============================================================================
// TESTS
// =============================================================================
