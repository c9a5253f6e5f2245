//! 8-Ball Rules
//!
//! Pure transition from (rules state, shooter, physical shot result) to the
//! next rules state. No physics and no I/O happen here.
//!
//! ```text
//!   AwaitingShot ──shot──► Evaluating ──┬──► AwaitingShot (turn kept or passed)
//!                                       └──► GameOver     (eight ball decided it)
//! ```
//!
//! Rule table:
//!
//! | #  | Rule                                                              |
//! |----|-------------------------------------------------------------------|
//! | 1  | The break is shot number 0                                        |
//! | 2  | Legal first contact: any ball on the break; any but the 8 on an   |
//! |    | open table; own group while it has balls; the 8 once cleared     |
//! | 3  | Fouls: no contact, wrong ball first, scratch, no rail             |
//! | 4  | Eight on the break is re-spotted, never a win or loss             |
//! | 5  | Eight later wins iff the group was cleared and the shot is clean  |
//! | 6  | First legal pot on an open table (not the break) assigns groups   |
//! | 7  | Legal shots credit pocketed balls of the shooter's group          |
//! | 8  | Turn kept iff legal and something was credited                    |
//! | 9  | Every evaluated shot increments the shot number                   |
//! | 10 | Inconsistent results are fatal                                    |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::{BallKind, Group, RulesPhase, RulesState, Side};
use crate::game::table::{CUE_BALL, EIGHT_BALL};
use crate::game::tick::ShotResult;

/// A foul committed on a shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Foul {
    /// The cue ball touched nothing
    NoContact,
    /// The first ball struck was not a legal target
    WrongBallFirst,
    /// The cue ball was pocketed
    Scratch,
    /// After contact nothing was pocketed and no ball reached a cushion
    NoRail,
    /// The eight went down before the shooter's group was cleared
    EightBallEarly,
}

/// Rules evaluation failure. Always fatal to the match instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// The shot result contradicts the table state
    #[error("inconsistent shot result: {0}")]
    Inconsistent(String),
}

/// Outcome of evaluating one shot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RulesOutcome {
    /// Next rules state
    pub state: RulesState,
    /// Fouls found on the shot
    pub fouls: Vec<Foul>,
    /// Balls credited to the shooter
    pub credited: Vec<u8>,
    /// The eight must go back on the foot spot
    pub respot_eight: bool,
}

fn inconsistent(reason: impl Into<String>) -> RulesError {
    RulesError::Inconsistent(reason.into())
}

/// Reject results that could not have come from the table.
fn check_consistency(state: &RulesState, shooter: Side, result: &ShotResult) -> Result<(), RulesError> {
    if state.is_over() {
        return Err(inconsistent("shot evaluated after game over"));
    }
    if shooter != state.turn {
        return Err(inconsistent(format!("{shooter} shot on {}'s turn", state.turn)));
    }

    let mut seen = [false; 16];
    for &id in &result.on_table_before {
        if id == CUE_BALL || id as usize >= seen.len() {
            return Err(inconsistent(format!("ball {id} listed as object ball")));
        }
        if std::mem::replace(&mut seen[id as usize], true) {
            return Err(inconsistent(format!("ball {id} listed twice on table")));
        }
    }

    let mut pocketed = [false; 16];
    for &id in &result.pocketed {
        if id as usize >= pocketed.len() || std::mem::replace(&mut pocketed[id as usize], true) {
            return Err(inconsistent(format!("ball {id} pocketed twice or unknown")));
        }
        if id != CUE_BALL && !seen[id as usize] {
            return Err(inconsistent(format!("ball {id} pocketed but was not on the table")));
        }
    }

    if let Some(id) = result.first_contact {
        if id as usize >= seen.len() || !seen[id as usize] {
            return Err(inconsistent(format!("first contact {id} was not on the table")));
        }
    }

    if result.cue_scratch != pocketed[CUE_BALL as usize] {
        return Err(inconsistent("scratch flag disagrees with pocketed list"));
    }
    Ok(())
}

/// Evaluate a shot.
///
/// `state` is the rules state before the shot, `shooter` the side that
/// shot. The returned state is the one to install on the engine.
pub fn evaluate_shot(
    state: &RulesState,
    shooter: Side,
    result: &ShotResult,
) -> Result<RulesOutcome, RulesError> {
    check_consistency(state, shooter, result)?;

    let is_break = state.shot_number == 0;
    let group = state.group_of(shooter);
    let open = group == Group::Any;
    let cleared = !open && !result.on_table_before.iter().any(|&id| group.contains(id));

    let object_pocketed: Vec<u8> = result
        .pocketed
        .iter()
        .copied()
        .filter(|&id| id != CUE_BALL)
        .collect();
    let eight_down = object_pocketed.contains(&EIGHT_BALL);

    // Fouls
    let mut fouls = Vec::new();
    match result.first_contact {
        None => fouls.push(Foul::NoContact),
        Some(id) => {
            let legal = if is_break {
                true
            } else if open {
                BallKind::of(id) != BallKind::Eight
            } else if cleared {
                id == EIGHT_BALL
            } else {
                group.contains(id)
            };
            if !legal {
                fouls.push(Foul::WrongBallFirst);
            }
        }
    }
    if result.cue_scratch {
        fouls.push(Foul::Scratch);
    }
    if result.first_contact.is_some() && object_pocketed.is_empty() && !result.rail_after_contact {
        fouls.push(Foul::NoRail);
    }
    if eight_down && !is_break && !cleared {
        fouls.push(Foul::EightBallEarly);
    }

    let mut next = state.clone();
    next.shot_number = state.shot_number + 1;
    let legal = fouls.is_empty();

    // Group assignment on the first legal pot after the break
    if legal && !is_break && open {
        if let Some(&first) = object_pocketed.iter().find(|&&id| id != EIGHT_BALL) {
            next.assign_groups(shooter, Group::of_ball(first));
        }
    }

    // Credit
    let credited: Vec<u8> = if legal {
        let target = next.group_of(shooter);
        object_pocketed
            .iter()
            .copied()
            .filter(|&id| target.contains(id))
            .collect()
    } else {
        Vec::new()
    };
    *next.score_mut(shooter) += credited.len() as u32;

    // Eight ball decides the game after the break
    if eight_down && !is_break {
        let winner = if legal && cleared { shooter } else { shooter.opponent() };
        next.phase = RulesPhase::GameOver;
        next.winner = Some(winner);
        next.foul = !legal;
        next.ball_in_hand = false;
        next.message = format!("{winner} wins");
        return Ok(RulesOutcome {
            state: next,
            fouls,
            credited,
            respot_eight: false,
        });
    }

    let keeps_turn = legal && !credited.is_empty();
    next.phase = RulesPhase::AwaitingShot;
    next.turn = if keeps_turn { shooter } else { shooter.opponent() };
    next.foul = !legal;
    next.ball_in_hand = !legal;
    next.message = if !legal {
        format!("{shooter} fouled, {} has ball in hand", next.turn)
    } else if keeps_turn {
        format!("{shooter} continues")
    } else {
        format!("{} to shoot", next.turn)
    };

    Ok(RulesOutcome {
        state: next,
        fouls,
        credited,
        respot_eight: eight_down && is_break,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on_table() -> Vec<u8> {
        (1..=15).collect()
    }

    fn result(first_contact: Option<u8>, pocketed: &[u8], rail: bool) -> ShotResult {
        ShotResult {
            pocketed: pocketed.to_vec(),
            fouls: Vec::new(),
            first_contact,
            cue_scratch: pocketed.contains(&CUE_BALL),
            steps: 100,
            duration_ms: 333,
            stalled: false,
            cushion_contacts: rail as u32,
            rail_after_contact: rail,
            on_table_before: all_on_table(),
            state_hash: String::new(),
            events: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn after_break() -> RulesState {
        RulesState {
            shot_number: 1,
            ..RulesState::default()
        }
    }

    fn with_groups(p1: Group) -> RulesState {
        let mut state = after_break();
        state.assign_groups(Side::P1, p1);
        state
    }

    #[test]
    fn test_break_with_pot_keeps_turn() {
        let out = evaluate_shot(&RulesState::default(), Side::P1, &result(Some(1), &[3, 11], true)).unwrap();
        assert!(out.fouls.is_empty());
        assert_eq!(out.state.turn, Side::P1);
        assert_eq!(out.state.p1_score, 2);
        // Groups stay open after the break
        assert_eq!(out.state.p1_group, Group::Any);
        assert_eq!(out.state.shot_number, 1);
    }

    #[test]
    fn test_break_without_pot_passes_turn() {
        let out = evaluate_shot(&RulesState::default(), Side::P1, &result(Some(1), &[], true)).unwrap();
        assert!(out.fouls.is_empty());
        assert_eq!(out.state.turn, Side::P2);
        assert!(!out.state.ball_in_hand);
    }

    #[test]
    fn test_eight_on_break_is_respotted() {
        let out = evaluate_shot(&RulesState::default(), Side::P1, &result(Some(1), &[8], true)).unwrap();
        assert!(out.respot_eight);
        assert_eq!(out.state.phase, RulesPhase::AwaitingShot);
        assert_eq!(out.state.winner, None);
        assert!(out.fouls.is_empty());
        // The eight is never credited
        assert_eq!(out.state.p1_score, 0);
    }

    #[test]
    fn test_eight_on_break_with_scratch_is_a_foul() {
        let out = evaluate_shot(&RulesState::default(), Side::P1, &result(Some(1), &[8, 0], true)).unwrap();
        assert!(out.respot_eight);
        assert_eq!(out.fouls, vec![Foul::Scratch]);
        assert_eq!(out.state.turn, Side::P2);
        assert!(out.state.ball_in_hand);
    }

    #[test]
    fn test_no_contact_foul() {
        let out = evaluate_shot(&after_break(), Side::P1, &result(None, &[], false)).unwrap();
        assert_eq!(out.fouls, vec![Foul::NoContact]);
        assert_eq!(out.state.turn, Side::P2);
        assert!(out.state.ball_in_hand);
        assert!(out.state.foul);
    }

    #[test]
    fn test_open_table_eight_first_is_wrong_ball() {
        let out = evaluate_shot(&after_break(), Side::P1, &result(Some(8), &[], true)).unwrap();
        assert_eq!(out.fouls, vec![Foul::WrongBallFirst]);
    }

    #[test]
    fn test_group_assignment_on_first_legal_pot() {
        let out = evaluate_shot(&after_break(), Side::P2, &{
            let mut r = result(Some(10), &[10, 2], true);
            r.on_table_before = all_on_table();
            r
        });
        // p2 is not on turn
        assert!(out.is_err());

        let mut state = after_break();
        state.turn = Side::P2;
        let out = evaluate_shot(&state, Side::P2, &result(Some(10), &[10, 2], true)).unwrap();
        assert_eq!(out.state.p2_group, Group::Stripes);
        assert_eq!(out.state.p1_group, Group::Solids);
        // Only the stripe is credited
        assert_eq!(out.credited, vec![10]);
        assert_eq!(out.state.p2_score, 1);
        assert_eq!(out.state.turn, Side::P2);
    }

    #[test]
    fn test_wrong_group_first() {
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &result(Some(12), &[], true)).unwrap();
        assert_eq!(out.fouls, vec![Foul::WrongBallFirst]);
        assert_eq!(out.state.turn, Side::P2);
        assert!(out.state.ball_in_hand);
    }

    #[test]
    fn test_no_rail_foul() {
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &result(Some(2), &[], false)).unwrap();
        assert_eq!(out.fouls, vec![Foul::NoRail]);
    }

    #[test]
    fn test_pocketing_opponent_ball_passes_turn() {
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &result(Some(2), &[12], true)).unwrap();
        assert!(out.fouls.is_empty());
        assert!(out.credited.is_empty());
        assert_eq!(out.state.turn, Side::P2);
        assert!(!out.state.ball_in_hand);
    }

    #[test]
    fn test_early_eight_loses() {
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &result(Some(2), &[8], true)).unwrap();
        assert!(out.fouls.contains(&Foul::EightBallEarly));
        assert_eq!(out.state.phase, RulesPhase::GameOver);
        assert_eq!(out.state.winner, Some(Side::P2));
    }

    #[test]
    fn test_clean_eight_after_clearing_wins() {
        let mut r = result(Some(8), &[8], true);
        r.on_table_before = vec![8, 9, 10];
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &r).unwrap();
        assert!(out.fouls.is_empty());
        assert_eq!(out.state.winner, Some(Side::P1));
        assert_eq!(out.state.phase, RulesPhase::GameOver);
    }

    #[test]
    fn test_eight_with_scratch_after_clearing_loses() {
        let mut r = result(Some(8), &[8, 0], true);
        r.on_table_before = vec![8, 9];
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &r).unwrap();
        assert_eq!(out.fouls, vec![Foul::Scratch]);
        assert_eq!(out.state.winner, Some(Side::P2));
    }

    #[test]
    fn test_cleared_group_must_hit_eight_first() {
        let mut r = result(Some(9), &[], true);
        r.on_table_before = vec![8, 9];
        let out = evaluate_shot(&with_groups(Group::Solids), Side::P1, &r).unwrap();
        assert_eq!(out.fouls, vec![Foul::WrongBallFirst]);
    }

    #[test]
    fn test_inconsistent_results_rejected() {
        let state = after_break();
        // Pocketed a ball that was not on the table
        let mut r = result(Some(1), &[4], true);
        r.on_table_before = vec![1, 2];
        assert!(matches!(evaluate_shot(&state, Side::P1, &r), Err(RulesError::Inconsistent(_))));

        // Cue listed as object ball
        let mut r = result(Some(1), &[], true);
        r.on_table_before = vec![0, 1];
        assert!(evaluate_shot(&state, Side::P1, &r).is_err());

        // Duplicate pocket
        let r = result(Some(1), &[3, 3], true);
        assert!(evaluate_shot(&state, Side::P1, &r).is_err());

        // Scratch flag disagrees
        let mut r = result(Some(1), &[0], true);
        r.cue_scratch = false;
        assert!(evaluate_shot(&state, Side::P1, &r).is_err());

        // After game over
        let mut over = after_break();
        over.phase = RulesPhase::GameOver;
        assert!(evaluate_shot(&over, Side::P1, &result(Some(1), &[], true)).is_err());
    }

    #[test]
    fn test_shot_number_always_increments() {
        let mut state = RulesState::default();
        for (i, r) in [result(Some(1), &[], true), result(None, &[], false)].iter().enumerate() {
            let shooter = state.turn;
            state = evaluate_shot(&state, shooter, r).unwrap().state;
            assert_eq!(state.shot_number, i as u32 + 1);
        }
    }
}
