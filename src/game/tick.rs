//! Authoritative Shot Simulation
//!
//! Advances the table from the moment the cue strikes until every ball is
//! at rest. This loop must be 100% deterministic: it is what replay
//! verification re-runs.
//!
//! ```text
//! ┌───────────────────────── one step (1/300 s) ─────────────────────────┐
//! │ 1. integrate moving balls      p += v·dt                              │
//! │ 2. pocket capture              segment-circle test on the travel      │
//! │ 3. cushions                    reflect normal velocity, clamp inside  │
//! │ 4. ball pairs (ascending ids)  separate overlap, exchange impulse     │
//! │ 5. spin                        screw on first contact, english on     │
//! │                                the cue ball's first cushion           │
//! │ 6. friction                    drag + rolling deceleration, stop ε    │
//! │ 7. capture                     every `stride`-th step                 │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Fixed, FIXED_HALF, fixed_mul, fixed_div};
use crate::core::vec2::FixedVec2;
use crate::game::collision::{pocket_capture, resolve_ball_pair, resolve_cushions};
use crate::game::events::{ShotEvent, ShotEventKind};
use crate::game::input::{CaptureOptions, ShotInput};
use crate::game::rules::Foul;
use crate::game::state::{Ball, BallSet};
use crate::game::table::{steps_to_ms, TableConfig, CUE_BALL, MAX_STEPS, STEP_DT};

/// Fraction of the impact speed converted into follow/draw (0.5).
const SCREW_GAIN: Fixed = FIXED_HALF;

/// Fraction of the cue speed converted into sideways english (0.25).
const ENGLISH_GAIN: Fixed = 16384;

// =============================================================================
// FRAMES
// =============================================================================

/// Position of one ball in a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBall {
    /// Ball id
    pub id: u8,
    /// Center position
    pub position: FixedVec2,
    /// Still on the table
    pub active: bool,
}

/// Full table state at one simulation step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Step index
    pub step: u32,
    /// All sixteen balls
    pub balls: Vec<FrameBall>,
}

impl Frame {
    fn capture(step: u32, balls: &BallSet) -> Self {
        Self {
            step,
            balls: balls
                .iter()
                .map(|b| FrameBall {
                    id: b.id,
                    position: b.position,
                    active: b.active,
                })
                .collect(),
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Raw physical outcome of one shot.
#[derive(Debug, Default)]
pub struct SimulationOutcome {
    /// Everything that happened, in step order
    pub events: Vec<ShotEvent>,
    /// Pocketed ids in pocketing order
    pub pocketed: Vec<u8>,
    /// First ball the cue struck
    pub first_contact: Option<u8>,
    /// Cue ball went down
    pub cue_scratch: bool,
    /// Number of cushion contacts (all balls)
    pub cushion_contacts: u32,
    /// A ball touched a cushion after the first contact
    pub rail_after_contact: bool,
    /// Steps simulated
    pub steps: u32,
    /// Budget exhausted with balls still moving
    pub stalled: bool,
    /// Captured frames (empty without capture)
    pub frames: Vec<Frame>,
}

/// Outcome of an applied shot, after rules evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotResult {
    /// Pocketed ids in pocketing order
    pub pocketed: Vec<u8>,
    /// Fouls committed
    pub fouls: Vec<Foul>,
    /// First ball the cue struck
    pub first_contact: Option<u8>,
    /// Cue ball went down
    pub cue_scratch: bool,
    /// Simulated steps
    pub steps: u32,
    /// Simulated milliseconds (never wall clock)
    pub duration_ms: u64,
    /// Step budget was exhausted
    pub stalled: bool,
    /// Cushion contacts during the shot
    pub cushion_contacts: u32,
    /// A ball touched a rail after the first contact
    pub rail_after_contact: bool,
    /// Object balls on the table before the shot
    pub on_table_before: Vec<u8>,
    /// Hex SHA-256 of the resulting engine state
    pub state_hash: String,
    /// Physical events
    pub events: Vec<ShotEvent>,
    /// Captured frames
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
}

impl ShotResult {
    /// Build the physical part of a result; fouls and hash are filled in by
    /// the engine once the rules have run.
    pub fn from_outcome(outcome: SimulationOutcome, on_table_before: Vec<u8>) -> Self {
        Self {
            pocketed: outcome.pocketed,
            fouls: Vec::new(),
            first_contact: outcome.first_contact,
            cue_scratch: outcome.cue_scratch,
            steps: outcome.steps,
            duration_ms: steps_to_ms(outcome.steps),
            stalled: outcome.stalled,
            cushion_contacts: outcome.cushion_contacts,
            rail_after_contact: outcome.rail_after_contact,
            on_table_before,
            state_hash: String::new(),
            events: outcome.events,
            frames: outcome.frames,
        }
    }

    /// Whether the shot was a foul.
    pub fn is_foul(&self) -> bool {
        !self.fouls.is_empty()
    }
}

// =============================================================================
// SIMULATION
// =============================================================================

struct SpinState {
    screw_pending: bool,
    english_pending: bool,
}

/// Simulate one shot to rest.
///
/// The cue ball is launched along `shot.direction`; placement and turn
/// checks are the caller's job. Without `capture` no frames are stored.
///
/// Pocket capture has no speed threshold: a ball whose travel during a
/// step enters a pocket's capture circle drops at any speed. The swept
/// test stands in for "center inside the pocket at low speed", which a
/// fast ball can step straight over.
///
/// # Determinism
///
/// - Balls are processed in ascending id order
/// - Fixed-point math only
/// - No randomness, no clock
pub fn simulate_shot(
    balls: &mut BallSet,
    table: &TableConfig,
    shot: &ShotInput,
    capture: Option<CaptureOptions>,
) -> SimulationOutcome {
    let mut outcome = SimulationOutcome::default();
    let mut spin = SpinState {
        screw_pending: shot.screw != 0,
        english_pending: shot.english != 0,
    };

    if let Some(cue) = balls.get_mut(CUE_BALL) {
        cue.velocity = shot.direction.scale(table.launch_speed(shot.power));
    }

    let mut step = 0;
    while step < MAX_STEPS && !balls.all_stopped() {
        step += 1;
        advance(balls, table, shot, &mut spin, step, &mut outcome);

        if let Some(options) = capture {
            if step % options.stride == 0 && (outcome.frames.len() as u32) < options.max_frames {
                outcome.frames.push(Frame::capture(step, balls));
            }
        }
    }
    outcome.steps = step;

    if !balls.all_stopped() {
        outcome.stalled = true;
        outcome.events.push(ShotEvent::new(step, ShotEventKind::Stalled));
        for ball in balls.as_mut_slice() {
            ball.velocity = FixedVec2::ZERO;
        }
    }

    // The final resting state is always the last frame
    if let Some(options) = capture {
        if outcome.frames.last().map(|f| f.step) != Some(step) {
            if outcome.frames.len() as u32 >= options.max_frames {
                outcome.frames.pop();
            }
            outcome.frames.push(Frame::capture(step, balls));
        }
    }

    outcome
}

/// Run one physics step.
fn advance(
    balls: &mut BallSet,
    table: &TableConfig,
    shot: &ShotInput,
    spin: &mut SpinState,
    step: u32,
    outcome: &mut SimulationOutcome,
) {
    let slice = balls.as_mut_slice();

    // 1-2. Integrate and capture into pockets
    for ball in slice.iter_mut() {
        if !ball.is_moving() {
            continue;
        }
        let from = ball.position;
        ball.position = from + ball.velocity.scale(STEP_DT);
        if let Some(pocket) = pocket_capture(from, ball.position, table) {
            drop_ball(ball, pocket, step, outcome);
        }
    }

    // 3. Cushions
    for ball in slice.iter_mut() {
        if !ball.active || !resolve_cushions(ball, table) {
            continue;
        }
        outcome.cushion_contacts += 1;
        outcome.events.push(ShotEvent::new(step, ShotEventKind::Cushion { ball: ball.id }));
        if outcome.first_contact.is_some() {
            outcome.rail_after_contact = true;
        }
        if ball.id == CUE_BALL && spin.english_pending {
            spin.english_pending = false;
            apply_english(ball, shot.english);
        }
    }

    // 4-5. Ball pairs in ascending id order
    for i in 0..slice.len() {
        for j in (i + 1)..slice.len() {
            let (left, right) = slice.split_at_mut(j);
            let (a, b) = (&mut left[i], &mut right[0]);
            if !a.active || !b.active {
                continue;
            }
            let before = a.velocity;
            if !resolve_ball_pair(a, b, table.ball_radius, table.ball_restitution) {
                continue;
            }
            outcome.events.push(ShotEvent::new(
                step,
                ShotEventKind::BallContact { a: a.id, b: b.id },
            ));
            if a.id == CUE_BALL && outcome.first_contact.is_none() {
                outcome.first_contact = Some(b.id);
                if spin.screw_pending {
                    spin.screw_pending = false;
                    let boost = fixed_mul(fixed_mul(shot.screw, before.length()), SCREW_GAIN);
                    a.velocity = a.velocity + shot.direction.scale(boost);
                }
            }
        }
    }

    // Separation can nudge a ball past a rail or into a pocket mouth
    for ball in slice.iter_mut() {
        if !ball.active {
            continue;
        }
        ball.position = ball.position.clamp_to_rect(table.ball_min(), table.ball_max());
        if let Some(pocket) = table.pocket_at(ball.position) {
            let id = pocket.id;
            drop_ball(ball, id, step, outcome);
        }
    }

    // 6. Friction
    let drag = table.drag_factor_per_step();
    let decel = table.decel_per_step();
    for ball in slice.iter_mut() {
        if ball.is_moving() {
            apply_friction(ball, drag, decel, table.stop_speed);
        }
    }
}

fn drop_ball(ball: &mut Ball, pocket: u8, step: u32, outcome: &mut SimulationOutcome) {
    ball.active = false;
    ball.velocity = FixedVec2::ZERO;
    outcome.pocketed.push(ball.id);
    outcome.events.push(ShotEvent::new(
        step,
        ShotEventKind::Pocketed { ball: ball.id, pocket },
    ));
    if ball.id == CUE_BALL {
        outcome.cue_scratch = true;
    }
}

/// Sideways kick proportional to the current speed.
fn apply_english(ball: &mut Ball, english: Fixed) {
    let speed = ball.velocity.length();
    if speed == 0 {
        return;
    }
    let side = ball.velocity.div_scalar(speed).perpendicular();
    let kick = fixed_mul(fixed_mul(english, speed), ENGLISH_GAIN);
    ball.velocity = ball.velocity + side.scale(kick);
}

fn apply_friction(ball: &mut Ball, drag: Fixed, decel: Fixed, stop_speed: Fixed) {
    let velocity = ball.velocity.scale(drag);
    let speed = velocity.length();
    let slowed = speed - decel;
    if slowed <= stop_speed || speed == 0 {
        ball.velocity = FixedVec2::ZERO;
    } else {
        ball.velocity = velocity.scale(fixed_div(slowed, speed));
    }
}

// =============================================================================
// TESTS
// =============================================================================
