//! Candidate Shot Generation
//!
//! Three families, all in fixed-point:
//!
//! ```text
//!   direct   cue ──► ghost ● target ──────────────► pocket
//!   bank     cue ──► ghost ● target ──► rail ──► pocket
//!                                 (aimed at the pocket mirrored across the rail)
//!   random   seeded direction and power
//! ```
//!
//! The ghost ball is where the cue ball's center must be at contact:
//! one diameter behind the target on the target→pocket line.

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_clamp, fixed_div, fixed_mul, to_fixed};
use crate::core::geometry::rotate;
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::state::{BallSet, RulesState, Side};
use crate::game::table::{TableConfig, EIGHT_BALL};

/// cos(80°): cuts thinner than this are skipped.
const MIN_CUT_COS: Fixed = 11_380;

/// Smallest power fraction a planned shot uses (0.2).
const MIN_POWER_FRACTION: Fixed = 13_107;

/// Largest power fraction a planned shot uses (0.95).
const MAX_POWER_FRACTION: Fixed = 62_259;

/// Bank shots travel further (x1.25).
const BANK_POWER_BOOST: Fixed = 81_920;

/// Where a candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    /// Straight pot
    Direct {
        /// Object ball
        target: u8,
        /// Pocket index
        pocket: u8,
    },
    /// One-rail bank
    Bank {
        /// Object ball
        target: u8,
        /// Pocket index
        pocket: u8,
        /// Rail index in `TableConfig::rail_lines` order
        rail: u8,
    },
    /// Exploration shot
    Random,
}

/// A shot to try in the sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Family and aim point
    pub kind: CandidateKind,
    /// Unit cue direction
    pub direction: FixedVec2,
    /// Power in `[0, max_power]`
    pub power: Fixed,
    /// Higher is easier; orders planned shots
    pub ease: Fixed,
}

/// Object balls the shooter may legally hit first.
pub fn legal_targets(rules: &RulesState, side: Side, balls: &BallSet) -> Vec<u8> {
    let active = balls.active_object_ids();
    if rules.shot_number == 0 {
        return active;
    }
    let group = rules.group_of(side);
    let targets: Vec<u8> = active.iter().copied().filter(|&id| group.contains(id)).collect();
    if targets.is_empty() {
        // Group cleared: only the eight is left to hit
        return active.into_iter().filter(|&id| id == EIGHT_BALL).collect();
    }
    targets
}

/// Aim geometry for sending `target` toward `goal`.
struct Aim {
    direction: FixedVec2,
    travel: Fixed,
    cut_cos: Fixed,
}

fn aim(cue: FixedVec2, target: FixedVec2, goal: FixedVec2, radius: Fixed) -> Option<Aim> {
    let to_goal = goal - target;
    let goal_dist = to_goal.length();
    if goal_dist == 0 {
        return None;
    }
    let line = to_goal.div_scalar(goal_dist);
    let ghost = target - line.scale(radius * 2);

    let to_ghost = ghost - cue;
    let ghost_dist = to_ghost.length();
    if ghost_dist == 0 {
        return None;
    }
    let direction = to_ghost.div_scalar(ghost_dist);
    let cut_cos = direction.dot(line);
    if cut_cos < MIN_CUT_COS {
        return None;
    }

    // Thin cuts pass less speed on, so they need more
    let travel = ghost_dist + fixed_div(goal_dist, cut_cos);
    Some(Aim {
        direction,
        travel,
        cut_cos,
    })
}

/// Power for a path length, as a fraction of max scaled by the diagonal.
fn plan_power(table: &TableConfig, travel: Fixed) -> Fixed {
    let diagonal = FixedVec2::new(table.width, table.height).length();
    let fraction = to_fixed(0.25) + fixed_mul(to_fixed(0.6), fixed_div(travel, diagonal));
    let fraction = fixed_clamp(fraction, MIN_POWER_FRACTION, MAX_POWER_FRACTION);
    fixed_mul(table.max_power, fraction)
}

fn ease_of(aim: &Aim, table: &TableConfig) -> Fixed {
    // Straighter and shorter is easier
    aim.cut_cos - fixed_div(aim.travel, table.width)
}

/// Straight pots for every target x pocket, easiest first.
pub fn direct_candidates(table: &TableConfig, balls: &BallSet, cue: FixedVec2, targets: &[u8]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for &target in targets {
        let Some(ball) = balls.get(target) else { continue };
        for pocket in &table.pockets {
            if let Some(a) = aim(cue, ball.position, pocket.center, table.ball_radius) {
                out.push(Candidate {
                    kind: CandidateKind::Direct { target, pocket: pocket.id },
                    direction: a.direction,
                    power: plan_power(table, a.travel),
                    ease: ease_of(&a, table),
                });
            }
        }
    }
    sort_by_ease(&mut out);
    out
}

/// One-rail banks: each pocket mirrored across each rail line.
pub fn bank_candidates(table: &TableConfig, balls: &BallSet, cue: FixedVec2, targets: &[u8]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let rails = table.rail_lines();
    for &target in targets {
        let Some(ball) = balls.get(target) else { continue };
        for pocket in &table.pockets {
            for (rail, line) in rails.iter().enumerate() {
                let mirrored = pocket.center.reflect_across(*line);
                if let Some(a) = aim(cue, ball.position, mirrored, table.ball_radius) {
                    let power = fixed_mul(plan_power(table, a.travel), BANK_POWER_BOOST);
                    out.push(Candidate {
                        kind: CandidateKind::Bank {
                            target,
                            pocket: pocket.id,
                            rail: rail as u8,
                        },
                        direction: a.direction,
                        power: power.min(table.max_power),
                        ease: ease_of(&a, table),
                    });
                }
            }
        }
    }
    sort_by_ease(&mut out);
    out
}

/// `count` exploration shots.
pub fn random_candidates(table: &TableConfig, rng: &mut DeterministicRng, count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|_| Candidate {
            kind: CandidateKind::Random,
            direction: rng.random_direction(),
            power: rng.next_fixed_range(
                fixed_mul(table.max_power, MIN_POWER_FRACTION),
                fixed_mul(table.max_power, to_fixed(0.9)),
            ),
            ease: 0,
        })
        .collect()
}

fn sort_by_ease(candidates: &mut [Candidate]) {
    // Stable: equal ease keeps generation order
    candidates.sort_by(|a, b| b.ease.cmp(&a.ease));
}

/// Perturb aim and power by up to `max_angle` radians and `max_power_frac`.
pub fn jitter(
    candidate: Candidate,
    rng: &mut DeterministicRng,
    max_angle: Fixed,
    max_power_frac: Fixed,
    max_power: Fixed,
) -> Candidate {
    let angle = rng.next_fixed_range(-max_angle, max_angle);
    let factor = FIXED_ONE + rng.next_fixed_range(-max_power_frac, max_power_frac);
    Candidate {
        direction: rotate(candidate.direction, angle).normalize(),
        power: fixed_clamp(fixed_mul(candidate.power, factor), 0, max_power),
        ..candidate
    }
}

// =============================================================================
// TESTS
// =============================================================================
