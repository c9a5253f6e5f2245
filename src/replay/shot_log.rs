//! Shot Log
//!
//! Every applied shot is appended to the match's shot log in engine space,
//! rounded to 4 decimals. The log plus the match seed is everything needed
//! to rebuild the match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::fixed::Fixed;
use crate::game::input::{RawShot, ShotInput, ValidationError};
use crate::game::state::Side;

/// What produced a logged shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotTrigger {
    /// Submitted by a player
    Human,
    /// Chosen by the AI
    Ai,
    /// Zero-power shot applied when a turn timed out
    TurnTimeout,
}

/// One logged shot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotLogEntry {
    /// 1-based sequence number (0 = unknown)
    #[serde(default)]
    pub seq: u64,
    /// When the shot was accepted
    pub timestamp: DateTime<Utc>,
    /// Shooter
    pub actor_side: Side,
    /// Shot payload in engine space
    #[serde(flatten)]
    pub shot: RawShot,
    /// Origin of the shot
    pub trigger: ShotTrigger,
}

impl ShotLogEntry {
    /// Create an entry; the payload is stored rounded to 4 decimals.
    pub fn new(
        seq: u64,
        timestamp: DateTime<Utc>,
        actor_side: Side,
        shot: &RawShot,
        trigger: ShotTrigger,
    ) -> Self {
        Self {
            seq,
            timestamp,
            actor_side,
            shot: shot.rounded(),
            trigger,
        }
    }

    /// The engine input this entry replays as.
    pub fn to_input(&self, max_power: Fixed) -> Result<ShotInput, ValidationError> {
        ShotInput::from_raw(&self.shot, max_power)
    }
}

/// Order two entries: by sequence when both have one, else by timestamp.
fn log_order(a: &ShotLogEntry, b: &ShotLogEntry) -> std::cmp::Ordering {
    if a.seq > 0 && b.seq > 0 {
        a.seq.cmp(&b.seq)
    } else {
        a.timestamp.cmp(&b.timestamp)
    }
}

/// Replay order of a shot log.
///
/// The mixed comparator is not a total order, so a stable insertion sort
/// is used: the result depends only on the input order.
pub fn order_shot_log(log: &[ShotLogEntry]) -> Vec<ShotLogEntry> {
    let mut ordered = log.to_vec();
    for i in 1..ordered.len() {
        let mut j = i;
        while j > 0 && log_order(&ordered[j - 1], &ordered[j]).is_gt() {
            ordered.swap(j - 1, j);
            j -= 1;
        }
    }
    ordered
}

// =============================================================================
// TESTS
// =============================================================================
