//! Game State Definitions
//!
//! Balls, sides, groups and the rules state of a match.
//! The ball set is a fixed array indexed by ball id for deterministic order.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Fixed, fixed_mul};
use crate::core::hash::StateHasher;
use crate::core::vec2::FixedVec2;
use crate::game::table::{BALL_COUNT, CUE_BALL, EIGHT_BALL};

// =============================================================================
// SIDES AND GROUPS
// =============================================================================

/// One of the two seats at the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Player one (breaks)
    P1,
    /// Player two
    P2,
}

impl Side {
    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::P1 => Side::P2,
            Side::P2 => Side::P1,
        }
    }

    /// Stable numeric tag used in hashes and seed derivation.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Side::P1 => 1,
            Side::P2 => 2,
        }
    }

    /// Wire name ("p1" / "p2").
    pub fn as_str(self) -> &'static str {
        match self {
            Side::P1 => "p1",
            Side::P2 => "p2",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target group of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Group {
    /// Balls 1-7
    Solids,
    /// Balls 9-15
    Stripes,
    /// Not yet assigned (open table)
    #[default]
    Any,
}

impl Group {
    /// The opposite group (`Any` stays `Any`).
    pub fn complement(self) -> Group {
        match self {
            Group::Solids => Group::Stripes,
            Group::Stripes => Group::Solids,
            Group::Any => Group::Any,
        }
    }

    /// Whether an object ball belongs to this group.
    ///
    /// `Any` contains every object ball except the eight.
    pub fn contains(self, id: u8) -> bool {
        match (self, BallKind::of(id)) {
            (Group::Solids, BallKind::Solid) => true,
            (Group::Stripes, BallKind::Stripe) => true,
            (Group::Any, BallKind::Solid | BallKind::Stripe) => true,
            _ => false,
        }
    }

    /// Group of an object ball (`Any` for cue and eight).
    pub fn of_ball(id: u8) -> Group {
        match BallKind::of(id) {
            BallKind::Solid => Group::Solids,
            BallKind::Stripe => Group::Stripes,
            _ => Group::Any,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Group::Solids => 1,
            Group::Stripes => 2,
            Group::Any => 0,
        }
    }
}

/// What a ball id is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BallKind {
    /// Ball 0
    Cue,
    /// Balls 1-7
    Solid,
    /// Ball 8
    Eight,
    /// Balls 9-15
    Stripe,
    /// Anything else
    Invalid,
}

impl BallKind {
    /// Classify a ball id.
    pub fn of(id: u8) -> BallKind {
        match id {
            CUE_BALL => BallKind::Cue,
            1..=7 => BallKind::Solid,
            EIGHT_BALL => BallKind::Eight,
            9..=15 => BallKind::Stripe,
            _ => BallKind::Invalid,
        }
    }
}

// =============================================================================
// BALLS
// =============================================================================

/// A single ball.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    /// Ball id (0 = cue)
    pub id: u8,
    /// Center position
    pub position: FixedVec2,
    /// Velocity in units/s
    pub velocity: FixedVec2,
    /// Still on the table
    pub active: bool,
}

impl Ball {
    /// A resting ball at a position.
    pub fn at(id: u8, position: FixedVec2) -> Self {
        Self {
            id,
            position,
            velocity: FixedVec2::ZERO,
            active: true,
        }
    }

    /// Whether the ball is on the table and moving.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.active && self.velocity != FixedVec2::ZERO
    }
}

/// The sixteen balls, indexed by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallSet {
    balls: Vec<Ball>,
}

impl BallSet {
    /// Build from a vector; callers guarantee `balls[i].id == i`.
    pub(crate) fn from_vec(balls: Vec<Ball>) -> Self {
        Self { balls }
    }

    /// Check the id-per-index invariant.
    pub fn is_well_formed(&self) -> bool {
        self.balls.len() == BALL_COUNT
            && self.balls.iter().enumerate().all(|(i, b)| b.id as usize == i)
    }

    /// Ball by id.
    #[inline]
    pub fn get(&self, id: u8) -> Option<&Ball> {
        self.balls.get(id as usize)
    }

    /// Mutable ball by id.
    #[inline]
    pub fn get_mut(&mut self, id: u8) -> Option<&mut Ball> {
        self.balls.get_mut(id as usize)
    }

    /// All balls in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Ball> {
        self.balls.iter()
    }

    /// Mutable slice in id order.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Ball] {
        &mut self.balls
    }

    /// The cue ball.
    pub fn cue(&self) -> Option<&Ball> {
        self.get(CUE_BALL)
    }

    /// Ids of object balls still on the table, ascending.
    pub fn active_object_ids(&self) -> Vec<u8> {
        self.balls
            .iter()
            .filter(|b| b.active && b.id != CUE_BALL)
            .map(|b| b.id)
            .collect()
    }

    /// Whether a ball of `radius` centered at `point` would touch no active
    /// ball other than `ignore`.
    pub fn is_free(&self, point: FixedVec2, radius: Fixed, ignore: Option<u8>) -> bool {
        let min_dist = radius * 2;
        let min_dist_sq = fixed_mul(min_dist, min_dist);
        self.balls
            .iter()
            .filter(|b| b.active && Some(b.id) != ignore)
            .all(|b| b.position.distance_squared(point) >= min_dist_sq)
    }

    /// Whether every active ball is at rest.
    pub fn all_stopped(&self) -> bool {
        self.balls.iter().all(|b| !b.is_moving())
    }

    /// Hash every ball in id order.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.balls.len() as u8);
        for ball in &self.balls {
            hasher.update_u8(ball.id);
            hasher.update_vec2(ball.position);
            hasher.update_vec2(ball.velocity);
            hasher.update_bool(ball.active);
        }
    }
}

// =============================================================================
// RULES STATE
// =============================================================================

/// Phase of the rules state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RulesPhase {
    /// Waiting for the current side to shoot
    #[default]
    AwaitingShot,
    /// A shot is being simulated and evaluated
    Evaluating,
    /// A winner has been decided
    GameOver,
}

impl RulesPhase {
    fn tag(self) -> u8 {
        match self {
            RulesPhase::AwaitingShot => 0,
            RulesPhase::Evaluating => 1,
            RulesPhase::GameOver => 2,
        }
    }
}

/// Turn, groups, scores and outcome of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesState {
    /// Current phase
    pub phase: RulesPhase,
    /// Side to shoot
    pub turn: Side,
    /// Player one's group
    pub p1_group: Group,
    /// Player two's group
    pub p2_group: Group,
    /// Balls credited to player one
    pub p1_score: u32,
    /// Balls credited to player two
    pub p2_score: u32,
    /// Last shot was a foul
    pub foul: bool,
    /// Evaluated shots so far
    pub shot_number: u32,
    /// Winner once the phase is `GameOver`
    pub winner: Option<Side>,
    /// Human readable status line
    pub message: String,
    /// Incoming shooter may place the cue ball
    pub ball_in_hand: bool,
}

impl Default for RulesState {
    fn default() -> Self {
        Self {
            phase: RulesPhase::AwaitingShot,
            turn: Side::P1,
            p1_group: Group::Any,
            p2_group: Group::Any,
            p1_score: 0,
            p2_score: 0,
            foul: false,
            shot_number: 0,
            winner: None,
            message: "p1 to break".to_string(),
            ball_in_hand: false,
        }
    }
}

impl RulesState {
    /// Group of a side.
    pub fn group_of(&self, side: Side) -> Group {
        match side {
            Side::P1 => self.p1_group,
            Side::P2 => self.p2_group,
        }
    }

    /// Score of a side.
    pub fn score_of(&self, side: Side) -> u32 {
        match side {
            Side::P1 => self.p1_score,
            Side::P2 => self.p2_score,
        }
    }

    /// Mutable score of a side.
    pub fn score_mut(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::P1 => &mut self.p1_score,
            Side::P2 => &mut self.p2_score,
        }
    }

    /// Assign a group to a side and the complement to the opponent.
    pub fn assign_groups(&mut self, side: Side, group: Group) {
        match side {
            Side::P1 => {
                self.p1_group = group;
                self.p2_group = group.complement();
            }
            Side::P2 => {
                self.p2_group = group;
                self.p1_group = group.complement();
            }
        }
    }

    /// Whether the match has been decided.
    #[inline]
    pub fn is_over(&self) -> bool {
        self.phase == RulesPhase::GameOver
    }

    /// Hash every field in a fixed order.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.phase.tag());
        hasher.update_u8(self.turn.tag());
        hasher.update_u8(self.p1_group.tag());
        hasher.update_u8(self.p2_group.tag());
        hasher.update_u32(self.p1_score);
        hasher.update_u32(self.p2_score);
        hasher.update_bool(self.foul);
        hasher.update_u32(self.shot_number);
        hasher.update_u8(self.winner.map(Side::tag).unwrap_or(0));
        hasher.update_str(&self.message);
        hasher.update_bool(self.ball_in_hand);
    }
}

// =============================================================================
// TESTS
// =============================================================================
