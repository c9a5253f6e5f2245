//! Client Coordinate Mapping
//!
//! The client draws the table at a fixed display scale; the engine runs at
//! the match's adjustment scale. Both derive every length from the same
//! base table, so one factor converts between them:
//!
//! ```text
//!   client = engine * (client_scale / adjustment_scale)
//! ```
//!
//! Positions are rounded to 3 decimals on every crossing. Directions are
//! unit vectors and power is an abstract unit, so neither is scaled.

use crate::core::fixed::{round_places, to_float, OUTPUT_DECIMALS};
use crate::core::vec2::FixedVec2;
use crate::game::engine::Engine;
use crate::game::input::RawShot;
use crate::game::state::{Ball, Side};
use crate::game::table::{TableError, MAX_SCALE, MIN_SCALE};
use crate::game::tick::{Frame, FrameBall, ShotResult};
use crate::network::protocol::{ClientBall, ClientFrame, ClientGameState, ClientShot, ClientShotSummary};

/// Display scale clients render at unless configured otherwise.
pub const DEFAULT_CLIENT_SCALE: f64 = 0.015;

/// Converts between client and engine space for one match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientMapping {
    factor: f64,
}

fn check_scale(scale: f64) -> Result<f64, TableError> {
    if scale.is_finite() && (MIN_SCALE..=MAX_SCALE).contains(&scale) {
        Ok(scale)
    } else {
        Err(TableError::InvalidScale(scale))
    }
}

fn three(value: f64) -> f64 {
    round_places(value, OUTPUT_DECIMALS)
}

impl ClientMapping {
    /// Mapping for a match at `adjustment_scale` shown at `client_scale`.
    pub fn new(client_scale: f64, adjustment_scale: f64) -> Result<Self, TableError> {
        let factor = check_scale(client_scale)? / check_scale(adjustment_scale)?;
        Ok(Self { factor })
    }

    /// Client units per engine unit.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Client point to engine floats.
    pub fn to_engine_point(&self, point: [f64; 2]) -> [f64; 2] {
        [three(point[0] / self.factor), three(point[1] / self.factor)]
    }

    /// Engine point to client floats.
    pub fn to_client_point(&self, point: FixedVec2) -> [f64; 2] {
        [
            three(to_float(point.x) * self.factor),
            three(to_float(point.y) * self.factor),
        ]
    }

    /// Client shot to an engine-space raw shot.
    ///
    /// Values are not validated here; `ShotInput::from_raw` does that.
    pub fn to_engine_shot(&self, shot: &ClientShot) -> RawShot {
        RawShot {
            direction: shot.direction,
            power: shot.power,
            cue_ball_position: shot.cue_ball_position.map(|p| self.to_engine_point(p)),
            screw: shot.screw,
            english: shot.english,
        }
    }

    fn ball(&self, ball: &Ball) -> ClientBall {
        ClientBall {
            id: ball.id,
            position: self.to_client_point(ball.position),
            active: ball.active,
        }
    }

    fn frame_ball(&self, ball: &FrameBall) -> ClientBall {
        ClientBall {
            id: ball.id,
            position: self.to_client_point(ball.position),
            active: ball.active,
        }
    }

    /// Current engine state in client space.
    pub fn state(&self, engine: &Engine) -> ClientGameState {
        ClientGameState {
            balls: engine.balls().iter().map(|b| self.ball(b)).collect(),
            rules: engine.rules().clone(),
            state_hash: crate::core::hash::to_hex(&engine.state_hash()),
        }
    }

    /// Captured frame in client space.
    pub fn frame(&self, frame: &Frame) -> ClientFrame {
        ClientFrame {
            step: frame.step,
            balls: frame.balls.iter().map(|b| self.frame_ball(b)).collect(),
        }
    }

    /// Shot result summary; nothing in it is positional.
    pub fn summary(&self, shooter: Side, result: &ShotResult) -> ClientShotSummary {
        ClientShotSummary {
            shooter,
            pocketed: result.pocketed.clone(),
            fouls: result.fouls.clone(),
            first_contact: result.first_contact,
            cue_scratch: result.cue_scratch,
            duration_ms: result.duration_ms,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
