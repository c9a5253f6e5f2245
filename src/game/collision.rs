//! Collision Detection and Response
//!
//! Deterministic ball-ball, ball-cushion and ball-pocket handling.
//! Every function works on fixed-point values and touches balls in a
//! caller-defined (ascending id) order.

use crate::core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, fixed_mul};
use crate::core::geometry::segment_circle_intersection;
use crate::core::vec2::FixedVec2;
use crate::game::state::Ball;
use crate::game::table::TableConfig;

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(
    pos_a: FixedVec2,
    radius_a: Fixed,
    pos_b: FixedVec2,
    radius_b: Fixed,
) -> bool {
    let combined_radius = radius_a + radius_b;
    let combined_radius_sq = fixed_mul(combined_radius, combined_radius);
    pos_a.distance_squared(pos_b) < combined_radius_sq
}

/// Resolve a ball-ball contact between two active balls.
///
/// Overlap is split equally along the contact normal. When the balls are
/// approaching, an impulse `j = (1 + e) / 2 * v_rel·n` is exchanged (equal
/// masses). Returns `true` only when an impulse was applied, so balls
/// resting against each other do not count as contacts.
pub fn resolve_ball_pair(a: &mut Ball, b: &mut Ball, radius: Fixed, restitution: Fixed) -> bool {
    if !circles_overlap(a.position, radius, b.position, radius) {
        return false;
    }

    let delta = b.position - a.position;
    let distance = delta.length();
    let normal = if distance == 0 {
        // Coincident centers: pick a fixed axis
        FixedVec2::new(FIXED_ONE, 0)
    } else {
        delta.div_scalar(distance)
    };

    // Separate
    let overlap = radius * 2 - distance;
    if overlap > 0 {
        let push = normal.scale(fixed_mul(overlap, FIXED_HALF));
        a.position = a.position - push;
        b.position = b.position + push;
    }

    // Exchange momentum along the normal
    let approach = (a.velocity - b.velocity).dot(normal);
    if approach <= 0 {
        return false;
    }
    let impulse = fixed_mul(fixed_mul(FIXED_ONE + restitution, FIXED_HALF), approach);
    let exchange = normal.scale(impulse);
    a.velocity = a.velocity - exchange;
    b.velocity = b.velocity + exchange;
    true
}

/// Reflect a ball off any cushion it has crossed and clamp it back inside.
///
/// Returns `true` if a cushion was hit (at most one contact per step is
/// reported, corners included).
pub fn resolve_cushions(ball: &mut Ball, table: &TableConfig) -> bool {
    let min = table.ball_min();
    let max = table.ball_max();
    let e = table.cushion_restitution;
    let mut hit = false;

    if ball.position.x < min.x && ball.velocity.x < 0 {
        ball.velocity.x = -fixed_mul(ball.velocity.x, e);
        hit = true;
    } else if ball.position.x > max.x && ball.velocity.x > 0 {
        ball.velocity.x = -fixed_mul(ball.velocity.x, e);
        hit = true;
    }

    if ball.position.y < min.y && ball.velocity.y < 0 {
        ball.velocity.y = -fixed_mul(ball.velocity.y, e);
        hit = true;
    } else if ball.position.y > max.y && ball.velocity.y > 0 {
        ball.velocity.y = -fixed_mul(ball.velocity.y, e);
        hit = true;
    }

    ball.position = ball.position.clamp_to_rect(min, max);
    hit
}

/// Pocket whose capture circle the travel `from → to` enters first.
///
/// Ties on the entry parameter go to the lower pocket index. Speed is not
/// considered; any entry captures.
pub fn pocket_capture(from: FixedVec2, to: FixedVec2, table: &TableConfig) -> Option<u8> {
    let mut best: Option<(Fixed, u8)> = None;
    for pocket in &table.pockets {
        if let Some(t) = segment_circle_intersection(from, to, pocket.center, pocket.radius) {
            match best {
                Some((best_t, _)) if best_t <= t => {}
                _ => best = Some((t, pocket.id)),
            }
        }
    }
    best.map(|(_, id)| id)
}

// =============================================================================
// TESTS
// =============================================================================
