//! Shot Events
//!
//! Physical events recorded while a shot is simulated. They feed the shot
//! result (first contact, rails, pocketing order) and are sent to clients
//! for sound and effects cues.

use serde::{Deserialize, Serialize};

/// What happened during a simulation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShotEventKind {
    /// Two balls collided (lower id first)
    BallContact {
        /// Lower ball id
        a: u8,
        /// Higher ball id
        b: u8,
    },
    /// A ball bounced off a cushion
    Cushion {
        /// Ball id
        ball: u8,
    },
    /// A ball dropped into a pocket
    Pocketed {
        /// Ball id
        ball: u8,
        /// Pocket index
        pocket: u8,
    },
    /// Step budget ran out with balls still moving
    Stalled,
}

/// An event stamped with the step it happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotEvent {
    /// Simulation step (1-based)
    pub step: u32,
    /// Event payload
    #[serde(flatten)]
    pub kind: ShotEventKind,
}

impl ShotEvent {
    /// Create a new event.
    pub fn new(step: u32, kind: ShotEventKind) -> Self {
        Self { step, kind }
    }

    /// Whether this event involves the given ball.
    pub fn involves(&self, id: u8) -> bool {
        match self.kind {
            ShotEventKind::BallContact { a, b } => a == id || b == id,
            ShotEventKind::Cushion { ball } | ShotEventKind::Pocketed { ball, .. } => ball == id,
            ShotEventKind::Stalled => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
