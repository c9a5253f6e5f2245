//! Simulation Engine
//!
//! Owns one table: configuration, ball set, seeded generator and rules
//! state. [`Engine::apply_shot`] is the single mutation entry point.
//!
//! ```text
//!  apply_shot(turn, input, capture)
//!     │
//!     ├─ validate (turn, game over, capture, input ranges, placement)
//!     │      nothing is mutated before this point
//!     ├─ place cue ball (ball in hand)
//!     ├─ simulate_shot ──────────► SimulationOutcome
//!     ├─ re-spot cue on scratch    (head string)
//!     ├─ rules::evaluate_shot ───► RulesOutcome
//!     ├─ re-spot eight on break    (foot string)
//!     └─ hash ───────────────────► ShotResult
//! ```

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::fixed::{Fixed, FIXED_ONE, FIXED_SQRT3_HALF, fixed_mul, to_float};
use crate::core::hash::{to_hex, StateHash};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::input::{CaptureOptions, PlacementIssue, ShotInput, ValidationError};
use crate::game::rules::{evaluate_shot, RulesError};
use crate::game::state::{Ball, BallSet, RulesPhase, RulesState, Side};
use crate::game::table::{TableConfig, TableError, BALL_COUNT, CUE_BALL, EIGHT_BALL};
use crate::game::tick::{simulate_shot, ShotResult};
use crate::replay::snapshot::{hash_state, Snapshot, SnapshotError, SNAPSHOT_VERSION};

/// Rack order, apex first, one row per entry.
const RACK_ROWS: [&[u8]; 5] = [
    &[1],
    &[9, 2],
    &[3, 8, 10],
    &[11, 4, 5, 12],
    &[6, 13, 14, 7, 15],
];

/// Center distance between racked balls, in radii (2% gap).
const RACK_SPACING: Fixed = 133_693; // 2.04

/// Allowed direction length error for engine-space input: 1% plus
/// fixed-point conversion error.
const DIRECTION_SLACK: Fixed = FIXED_ONE / 100 + 4;

/// Engine failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Rejected input; the engine is unchanged
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Corrupt state; fatal to this match
    #[error("internal consistency failure: {0}")]
    Internal(String),
}

impl From<RulesError> for EngineError {
    fn from(err: RulesError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<SnapshotError> for EngineError {
    fn from(err: SnapshotError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// Authoritative state of one table.
#[derive(Clone, Debug)]
pub struct Engine {
    seed: u64,
    rng: DeterministicRng,
    table: TableConfig,
    balls: BallSet,
    rules: RulesState,
}

impl Engine {
    /// Fresh racked table: p1 to break, both groups open.
    pub fn new(seed: u64, adjustment_scale: f64) -> Result<Self, TableError> {
        let table = TableConfig::from_scale(adjustment_scale)?;
        let mut rng = DeterministicRng::new(seed);
        let balls = rack(&table, &mut rng);
        Ok(Self {
            seed,
            rng,
            table,
            balls,
            rules: RulesState::default(),
        })
    }

    /// Rebuild an engine from a validated snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, EngineError> {
        snapshot.validate()?;
        let rng = DeterministicRng::from_state(snapshot.rng_state)
            .ok_or(SnapshotError::InvalidRngState)?;
        Ok(Self {
            seed: snapshot.seed,
            rng,
            table: snapshot.table.clone(),
            balls: snapshot.balls.clone(),
            rules: snapshot.rules.clone(),
        })
    }

    /// Replace this engine's state with a snapshot's.
    ///
    /// On error the engine is left untouched.
    pub fn load_state(&mut self, snapshot: &Snapshot) -> Result<(), EngineError> {
        *self = Self::from_snapshot(snapshot)?;
        Ok(())
    }

    /// Serialize the full state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            seed: self.seed,
            rng_state: self.rng.state(),
            table: self.table.clone(),
            balls: self.balls.clone(),
            rules: self.rules.clone(),
        }
    }

    /// Hash of the current state (equals `snapshot().state_hash()`).
    pub fn state_hash(&self) -> StateHash {
        hash_state(self.seed, self.rng.state(), &self.table, &self.balls, &self.rules)
    }

    /// Match seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Table configuration.
    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    /// Ball set.
    pub fn balls(&self) -> &BallSet {
        &self.balls
    }

    /// Rules state.
    pub fn rules(&self) -> &RulesState {
        &self.rules
    }

    /// Side to shoot.
    pub fn turn(&self) -> Side {
        self.rules.turn
    }

    /// Whether a winner has been decided.
    pub fn is_over(&self) -> bool {
        self.rules.is_over()
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Dry-run check of a cue-ball placement. Never mutates.
    pub fn validate_cue_placement(&self, position: FixedVec2) -> Result<(), ValidationError> {
        let issue = if !self.table.contains_ball(position) {
            Some(PlacementIssue::OutOfBounds)
        } else if self.table.pocket_at(position).is_some() {
            Some(PlacementIssue::InPocket)
        } else if !self.balls.is_free(position, self.table.ball_radius, Some(CUE_BALL)) {
            Some(PlacementIssue::Overlapping)
        } else {
            None
        };
        match issue {
            Some(issue) => Err(ValidationError::IllegalPlacement(issue)),
            None => Ok(()),
        }
    }

    /// Move the cue ball while the shooter has ball in hand.
    pub fn place_cue_ball(&mut self, position: FixedVec2) -> Result<(), ValidationError> {
        if !self.rules.ball_in_hand {
            return Err(ValidationError::PlacementNotAllowed);
        }
        self.validate_cue_placement(position)?;
        self.set_cue(position);
        Ok(())
    }

    fn validate_input(&self, shot: &ShotInput) -> Result<(), ValidationError> {
        if !(0..=self.table.max_power).contains(&shot.power) {
            return Err(ValidationError::PowerOutOfRange {
                power: to_float(shot.power),
                max: to_float(self.table.max_power),
            });
        }
        let length = shot.direction.length();
        if (length - FIXED_ONE).abs() > DIRECTION_SLACK {
            return Err(ValidationError::MalformedDirection(to_float(length)));
        }
        for (field, value) in [("screw", shot.screw), ("english", shot.english)] {
            if !(-FIXED_ONE..=FIXED_ONE).contains(&value) {
                return Err(ValidationError::SpinOutOfRange {
                    field,
                    value: to_float(value),
                });
            }
        }
        Ok(())
    }

    /// Every check `apply_shot` makes before touching state.
    pub fn validate_shot(
        &self,
        turn: Side,
        shot: &ShotInput,
        capture: Option<CaptureOptions>,
    ) -> Result<(), ValidationError> {
        if self.rules.is_over() {
            return Err(ValidationError::MatchOver);
        }
        if turn != self.rules.turn {
            return Err(ValidationError::WrongTurn {
                expected: self.rules.turn,
                actual: turn,
            });
        }
        if let Some(options) = capture {
            options.validate()?;
        }
        self.validate_input(shot)?;
        match (self.rules.ball_in_hand, shot.cue_ball_position) {
            (true, Some(position)) => self.validate_cue_placement(position),
            (true, None) => Err(ValidationError::PlacementRequired),
            (false, Some(_)) => Err(ValidationError::PlacementNotAllowed),
            (false, None) => Ok(()),
        }
    }

    // =========================================================================
    // SHOTS
    // =========================================================================

    /// Simulate one shot and run the rules.
    ///
    /// Validation errors leave the engine untouched. `Internal` errors mean
    /// the match can no longer be trusted.
    pub fn apply_shot(
        &mut self,
        turn: Side,
        shot: &ShotInput,
        capture: Option<CaptureOptions>,
    ) -> Result<ShotResult, EngineError> {
        self.validate_shot(turn, shot, capture)?;

        if let Some(position) = shot.cue_ball_position {
            self.set_cue(position);
        }

        let on_table_before = self.balls.active_object_ids();
        self.rules.phase = RulesPhase::Evaluating;

        let outcome = simulate_shot(&mut self.balls, &self.table, shot, capture);
        let mut result = ShotResult::from_outcome(outcome, on_table_before);

        if result.stalled {
            warn!(shot = self.rules.shot_number, steps = result.steps, "Shot stalled at step budget");
        }

        if result.cue_scratch {
            let spot = self.free_spot(self.table.head_spot, FixedVec2::new(0, FIXED_ONE), CUE_BALL)?;
            self.set_cue(spot);
        }

        let evaluated = evaluate_shot(&self.rules, turn, &result)?;
        self.rules = evaluated.state;

        if evaluated.respot_eight {
            let spot = self.free_spot(self.table.foot_spot, FixedVec2::new(FIXED_ONE, 0), EIGHT_BALL)?;
            if let Some(eight) = self.balls.get_mut(EIGHT_BALL) {
                *eight = Ball::at(EIGHT_BALL, spot);
            }
        }

        result.fouls = evaluated.fouls;
        result.state_hash = to_hex(&self.state_hash());

        debug!(
            shooter = %turn,
            shot = self.rules.shot_number,
            pocketed = ?result.pocketed,
            fouls = ?result.fouls,
            first_contact = ?result.first_contact,
            steps = result.steps,
            "Shot applied"
        );

        Ok(result)
    }

    fn set_cue(&mut self, position: FixedVec2) {
        if let Some(cue) = self.balls.get_mut(CUE_BALL) {
            *cue = Ball::at(CUE_BALL, position);
        }
    }

    /// Nearest legal resting point to `anchor` along `axis` (unit vector),
    /// probing outward in half-radius steps, positive side first.
    fn free_spot(&self, anchor: FixedVec2, axis: FixedVec2, ball: u8) -> Result<FixedVec2, EngineError> {
        let radius = self.table.ball_radius;
        let step = axis.scale(radius / 2);
        let reach = (self.table.width.max(self.table.height) / (radius / 2).max(1)) + 1;

        for k in 0..=reach {
            for sign in [1i64, -1] {
                if k == 0 && sign < 0 {
                    continue;
                }
                let offset = FixedVec2::new(step.x * k * sign, step.y * k * sign);
                let point = anchor + offset;
                if self.table.contains_ball(point)
                    && self.table.pocket_at(point).is_none()
                    && self.balls.is_free(point, radius, Some(ball))
                {
                    return Ok(point);
                }
            }
        }
        Err(EngineError::Internal(format!("no free spot for ball {ball}")))
    }
}

/// Standard triangle at the foot spot with seeded micro-jitter.
fn rack(table: &TableConfig, rng: &mut DeterministicRng) -> BallSet {
    let radius = table.ball_radius;
    let spacing = fixed_mul(radius, RACK_SPACING);
    let row_step = fixed_mul(spacing, FIXED_SQRT3_HALF);
    let jitter = radius / 100;

    let mut balls: Vec<Ball> = (0..BALL_COUNT as u8)
        .map(|id| Ball::at(id, table.head_spot))
        .collect();

    for (row, ids) in RACK_ROWS.iter().enumerate() {
        let row = row as i64;
        for (slot, &id) in ids.iter().enumerate() {
            let lane = 2 * slot as i64 - row;
            let x = table.foot_spot.x + row_step * row + rng.next_fixed_range(-jitter, jitter);
            let y = table.foot_spot.y + spacing * lane / 2 + rng.next_fixed_range(-jitter, jitter);
            balls[id as usize] = Ball::at(id, FixedVec2::new(x, y));
        }
    }

    BallSet::from_vec(balls)
}

// =============================================================================
// TESTS
// =============================================================================
