//! AI Shot Search
//!
//! Generate candidates from a snapshot, simulate each one on a disposable
//! engine, keep the best scoring shot. The live engine is never touched.
//!
//! ```text
//!  difficulty ─► accuracy ─┬─► jitter width
//!                          ├─► random candidate count
//!                          └─► attempt budget
//!
//!  snapshot ─► placement? ─► direct ─► banks ─► randoms ─► simulate ─► score ─► best
//! ```

use thiserror::Error;
use tracing::debug;

use crate::ai::candidates::{
    bank_candidates, direct_candidates, jitter, legal_targets, random_candidates, Candidate,
};
use crate::core::fixed::{Fixed, INPUT_DECIMALS, round_places, to_fixed};
use crate::core::rng::{derive_stream_seed, DeterministicRng};
use crate::core::vec2::FixedVec2;
use crate::game::engine::Engine;
use crate::game::input::ShotInput;
use crate::game::state::{RulesState, Side};
use crate::game::table::CUE_BALL;
use crate::game::tick::ShotResult;
use crate::replay::metadata::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::replay::snapshot::Snapshot;

const WIN_SCORE: i64 = 10_000;
const LOSS_SCORE: i64 = -10_000;
const FOUL_SCORE: i64 = -2_000;
const SCRATCH_SCORE: i64 = -1_000;
const CREDITED_SCORE: i64 = 250;
const OTHER_POT_SCORE: i64 = -100;
const RETAIN_TURN_SCORE: i64 = 200;
const ANY_POT_SCORE: i64 = 50;

/// Largest aim error at accuracy 0 (radians).
const MAX_AIM_JITTER: f64 = 0.12;

/// Largest power error at accuracy 0.
const MAX_POWER_JITTER: f64 = 0.25;

/// Cue distance behind the target when placing with ball in hand, in radii.
const PLACEMENT_BACKOFF_RADII: i64 = 8;

/// AI failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// Snapshot did not validate
    #[error("snapshot rejected: {0}")]
    InvalidSnapshot(String),

    /// The match is already decided
    #[error("match is over")]
    MatchOver,

    /// Asked to shoot out of turn
    #[error("it is not {0}'s turn")]
    NotOurTurn(Side),

    /// Nothing legal could be found
    #[error("no legal shot available")]
    NoLegalShot,
}

/// Accuracy coefficient for a difficulty (clamped to 1..=100).
pub fn accuracy(difficulty: u8) -> f64 {
    let d = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) as f64;
    0.30 + 0.68 * (d / 100.0).powf(1.6)
}

/// Number of candidates simulated for a difficulty.
pub fn attempt_budget(difficulty: u8) -> usize {
    let d = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) as f64;
    8 + (d * 0.6).round() as usize
}

fn random_count(accuracy: f64) -> usize {
    2 + ((1.0 - accuracy) * 6.0).round() as usize
}

/// How many direct, bank and random candidates fit in `budget`.
///
/// Every random candidate is tried. Of the rest, banks get a third (at
/// least one when two or more attempts remain) and direct shots the
/// remainder; quota one family cannot use passes to the other.
fn split_budget(budget: usize, direct: usize, banks: usize, randoms: usize) -> (usize, usize, usize) {
    let randoms = randoms.min(budget);
    let rest = budget - randoms;
    let bank_quota = (rest / 3).max(usize::from(rest >= 2)).min(banks);
    let direct = (rest - bank_quota).min(direct);
    let banks = (rest - direct).min(banks);
    (direct, banks, randoms)
}

/// Candidates to simulate, direct first, then banks, then randoms.
fn plan_attempts(
    direct: Vec<Candidate>,
    banks: Vec<Candidate>,
    randoms: Vec<Candidate>,
    budget: usize,
) -> Vec<Candidate> {
    let (d, b, r) = split_budget(budget, direct.len(), banks.len(), randoms.len());
    direct
        .into_iter()
        .take(d)
        .chain(banks.into_iter().take(b))
        .chain(randoms.into_iter().take(r))
        .collect()
}

/// Score a simulated candidate from the shooter's point of view.
fn score_outcome(side: Side, before: &RulesState, after: &RulesState, result: &ShotResult) -> i64 {
    let mut score = 0;
    match after.winner {
        Some(winner) if winner == side => score += WIN_SCORE,
        Some(_) => score += LOSS_SCORE,
        None => {}
    }
    if result.is_foul() {
        score += FOUL_SCORE;
    }
    if result.cue_scratch {
        score += SCRATCH_SCORE;
    }

    let object_pots = result.pocketed.iter().filter(|&&id| id != CUE_BALL).count() as i64;
    let credited = after.score_of(side) as i64 - before.score_of(side) as i64;
    score += CREDITED_SCORE * credited;
    score += OTHER_POT_SCORE * (object_pots - credited);

    if !after.is_over() && after.turn == side {
        score += RETAIN_TURN_SCORE;
    }
    if object_pots > 0 {
        score += ANY_POT_SCORE;
    }
    score
}

fn to_input(candidate: &Candidate, placement: Option<FixedVec2>, max_power: Fixed) -> ShotInput {
    let input = ShotInput {
        direction: candidate.direction,
        power: candidate.power,
        cue_ball_position: placement,
        screw: 0,
        english: 0,
    };
    // Canonical 4-decimal form, identical to what the shot log replays
    ShotInput::from_raw(&input.to_raw(), max_power).unwrap_or(input)
}

/// A point as it comes back from a 4-decimal shot log.
fn canonical(point: FixedVec2) -> FixedVec2 {
    let (x, y) = point.to_floats();
    FixedVec2::from_floats(round_places(x, INPUT_DECIMALS), round_places(y, INPUT_DECIMALS))
}

/// Choose the cue-ball spot when the AI has ball in hand.
///
/// Behind the easiest target on its pocket line, then center table, then
/// a grid scan. Every spot is checked with a dry run.
pub(crate) fn choose_placement(engine: &Engine, targets: &[u8]) -> Option<FixedVec2> {
    let table = engine.table();
    let radius = table.ball_radius;

    let mut lines: Vec<(Fixed, FixedVec2)> = Vec::new();
    for &target in targets {
        let Some(ball) = engine.balls().get(target) else { continue };
        for pocket in &table.pockets {
            let to_pocket = pocket.center - ball.position;
            let dist = to_pocket.length();
            if dist == 0 {
                continue;
            }
            let behind = ball.position - to_pocket.div_scalar(dist).scale(radius * PLACEMENT_BACKOFF_RADII);
            lines.push((dist, behind));
        }
    }
    // Shortest pot first, stable on ties
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    let center = FixedVec2::new(table.width / 2, table.height / 2);
    let grid_step = (radius * 2).max(1);
    let grid = (1..)
        .map(move |i| table_grid_point(table.width, table.height, grid_step, i))
        .take_while(Option::is_some)
        .flatten();

    lines
        .into_iter()
        .map(|(_, spot)| spot)
        .chain(std::iter::once(center))
        .chain(grid)
        .map(canonical)
        .find(|&spot| engine.validate_cue_placement(spot).is_ok())
}

/// i-th point of a row-major grid over the table, `None` past the end.
fn table_grid_point(width: Fixed, height: Fixed, step: Fixed, i: i64) -> Option<FixedVec2> {
    let cols = width / step;
    let rows = height / step;
    if cols <= 0 || rows <= 0 || i > cols * rows {
        return None;
    }
    let idx = i - 1;
    Some(FixedVec2::new(step * (idx % cols) + step / 2, step * (idx / cols) + step / 2))
}

/// Pick a shot for `side` on the table described by `snapshot`.
///
/// Deterministic: the same snapshot, side and difficulty always give the
/// same shot.
pub fn choose_shot(snapshot: &Snapshot, side: Side, difficulty: u8) -> Result<ShotInput, AiError> {
    let engine = Engine::from_snapshot(snapshot).map_err(|e| AiError::InvalidSnapshot(e.to_string()))?;
    let rules = engine.rules().clone();
    if rules.is_over() {
        return Err(AiError::MatchOver);
    }
    if rules.turn != side {
        return Err(AiError::NotOurTurn(side));
    }

    let accuracy = accuracy(difficulty);
    let budget = attempt_budget(difficulty);
    let mut rng = DeterministicRng::new(derive_stream_seed(
        snapshot.seed,
        b"ai",
        rules.shot_number,
        side.tag(),
    ));

    let targets = legal_targets(&rules, side, engine.balls());
    let placement = if rules.ball_in_hand {
        Some(choose_placement(&engine, &targets).ok_or(AiError::NoLegalShot)?)
    } else {
        None
    };
    let cue = match placement {
        Some(spot) => spot,
        None => engine.balls().cue().map(|b| b.position).ok_or(AiError::NoLegalShot)?,
    };

    let table = engine.table();
    let planned = plan_attempts(
        direct_candidates(table, engine.balls(), cue, &targets),
        bank_candidates(table, engine.balls(), cue, &targets),
        random_candidates(table, &mut rng, random_count(accuracy)),
        budget,
    );

    let aim_jitter = to_fixed((1.0 - accuracy) * MAX_AIM_JITTER);
    let power_jitter = to_fixed((1.0 - accuracy) * MAX_POWER_JITTER);

    let mut best: Option<(i64, ShotInput)> = None;
    for candidate in planned {
        let shot = jitter(candidate, &mut rng, aim_jitter, power_jitter, table.max_power);
        let input = to_input(&shot, placement, table.max_power);

        let mut sandbox = engine.clone();
        let Ok(result) = sandbox.apply_shot(side, &input, None) else {
            continue;
        };
        let score = score_outcome(side, &rules, sandbox.rules(), &result);
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, input));
        }
    }

    if let Some((score, input)) = best {
        debug!(%side, difficulty, score, "AI shot chosen");
        return Ok(input);
    }

    // Nothing simulated: validated random fallback
    for _ in 0..budget {
        let fallback = random_candidates(table, &mut rng, 1);
        let Some(candidate) = fallback.first() else { break };
        let input = to_input(candidate, placement, table.max_power);
        if engine.validate_shot(side, &input, None).is_ok() {
            debug!(%side, difficulty, "AI fell back to a random shot");
            return Ok(input);
        }
    }
    Err(AiError::NoLegalShot)
}

// =============================================================================
// TESTS
// =============================================================================
