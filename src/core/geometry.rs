//! Deterministic Geometry
//!
//! Segment and circle tests used by pocket capture and AI aiming, plus an
//! integer CORDIC for angles. Everything here is pure integer math.
//!
//! ```text
//! segment_circle_intersection            atan2 (vectoring CORDIC)
//!
//!   p0 ●────────●────● p1                    y
//!              ╱ t  ╲                        │   ● (x, y)
//!             │  ○c  │  first entry t        │  ╱
//!              ╲    ╱   in [0, 1]            │ ╱ θ
//!                                            └──────── x
//! ```

use super::fixed::{
    Fixed, FIXED_ONE, FIXED_PI, FIXED_HALF_PI, FIXED_TWO_PI, FIXED_SCALE,
    fixed_abs, fixed_div, fixed_mul, fixed_clamp, isqrt,
};
use super::vec2::FixedVec2;

/// atan(2^-i) in Q16.16, i = 0..15
const CORDIC_ATAN: [Fixed; 16] = [
    51472, 30386, 16055, 8150, 4091, 2047, 1024, 512,
    256, 128, 64, 32, 16, 8, 4, 2,
];

/// Reciprocal of the CORDIC gain, 0.607253 * 65536
const CORDIC_GAIN_INV: Fixed = 39797;

/// Extra precision bits used while rotating.
const ROTATE_GUARD_BITS: i32 = 8;

// =============================================================================
// SEGMENTS
// =============================================================================

/// Intersection point of segments `a1-a2` and `b1-b2`.
///
/// Parallel and collinear segments return `None`.
pub fn segment_intersection(
    a1: FixedVec2,
    a2: FixedVec2,
    b1: FixedVec2,
    b2: FixedVec2,
) -> Option<FixedVec2> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.cross(s);
    if denom == 0 {
        return None;
    }

    let qp = b1 - a1;
    let t = fixed_div(qp.cross(s), denom);
    let u = fixed_div(qp.cross(r), denom);

    if (0..=FIXED_ONE).contains(&t) && (0..=FIXED_ONE).contains(&u) {
        Some(a1 + r.scale(t))
    } else {
        None
    }
}

/// First parameter `t` in `[0, 1]` at which the segment `p0-p1` enters
/// the circle. Returns `Some(0)` when `p0` already lies inside.
///
/// The quadratic is solved on raw integers (i128) so that very short
/// segments, as seen near the end of a roll, keep full precision.
pub fn segment_circle_intersection(
    p0: FixedVec2,
    p1: FixedVec2,
    center: FixedVec2,
    radius: Fixed,
) -> Option<Fixed> {
    let radius_sq = fixed_mul(radius, radius);
    if p0.distance_squared(center) <= radius_sq {
        return Some(0);
    }

    let d = p1 - p0;
    let f = p0 - center;

    // Cheap reject without a square root: |dx| + |dy| bounds the length
    let reach = radius + fixed_abs(d.x) + fixed_abs(d.y) + 1;
    if f.length_squared() > fixed_mul(reach, reach) {
        return None;
    }

    let (dx, dy) = (d.x as i128, d.y as i128);
    let (fx, fy) = (f.x as i128, f.y as i128);
    let r = radius as i128;

    let a = dx * dx + dy * dy;
    if a == 0 {
        return None;
    }
    let b = 2 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - r * r;

    let disc = b * b - 4 * a * c;
    if disc < 0 {
        return None;
    }

    let root = isqrt(disc as u128) as i128;
    let t = (((-b - root) << FIXED_SCALE) / (2 * a)) as Fixed;

    if (0..=FIXED_ONE).contains(&t) {
        Some(t)
    } else if p1.distance_squared(center) <= radius_sq {
        // Rounding pushed t just past the end while the end point is inside
        Some(FIXED_ONE)
    } else {
        None
    }
}

/// Squared distance from `p` to the closest point on segment `a-b`.
pub fn point_segment_distance_squared(p: FixedVec2, a: FixedVec2, b: FixedVec2) -> Fixed {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0 {
        return p.distance_squared(a);
    }
    let t = fixed_clamp(fixed_div((p - a).dot(ab), len_sq), 0, FIXED_ONE);
    p.distance_squared(a + ab.scale(t))
}

// =============================================================================
// ANGLES (CORDIC)
// =============================================================================

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(angle: Fixed) -> Fixed {
    let wrapped = (angle + FIXED_PI).rem_euclid(FIXED_TWO_PI) - FIXED_PI;
    if wrapped == -FIXED_PI { FIXED_PI } else { wrapped }
}

/// Angle of `(x, y)` in radians, range `(-π, π]`, via 16-iteration CORDIC.
///
/// `atan2(0, 0)` is 0.
pub fn atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == 0 && y == 0 {
        return 0;
    }

    // Bring the larger component near bit 40 so small vectors keep precision
    let magnitude = x.unsigned_abs().max(y.unsigned_abs());
    let shift = (magnitude.leading_zeros() as i32 - 23).max(0);
    let (mut x, mut y) = if shift > 0 {
        (x << shift, y << shift)
    } else {
        let down = -(magnitude.leading_zeros() as i32 - 23);
        (x >> down, y >> down)
    };

    // Rotate into the right half-plane
    let mut z: Fixed = 0;
    if x < 0 {
        if y >= 0 {
            (x, y) = (y, -x);
            z = FIXED_HALF_PI;
        } else {
            (x, y) = (-y, x);
            z = -FIXED_HALF_PI;
        }
    }

    for (i, step) in CORDIC_ATAN.iter().enumerate() {
        let (nx, ny) = if y > 0 {
            z += step;
            (x + (y >> i), y - (x >> i))
        } else {
            z -= step;
            (x - (y >> i), y + (x >> i))
        };
        x = nx;
        y = ny;
    }

    wrap_angle(z)
}

/// Rotate a vector counter-clockwise by `angle` radians.
pub fn rotate(v: FixedVec2, angle: Fixed) -> FixedVec2 {
    let mut angle = wrap_angle(angle);
    let mut x = v.x << ROTATE_GUARD_BITS;
    let mut y = v.y << ROTATE_GUARD_BITS;

    // CORDIC converges for |angle| <= ~99°, pre-rotate by a quarter turn
    if angle > FIXED_HALF_PI {
        (x, y) = (-y, x);
        angle -= FIXED_HALF_PI;
    } else if angle < -FIXED_HALF_PI {
        (x, y) = (y, -x);
        angle += FIXED_HALF_PI;
    }

    let mut z = angle;
    for (i, step) in CORDIC_ATAN.iter().enumerate() {
        let (nx, ny) = if z >= 0 {
            z -= step;
            (x - (y >> i), y + (x >> i))
        } else {
            z += step;
            (x + (y >> i), y - (x >> i))
        };
        x = nx;
        y = ny;
    }

    let half = 1 << (ROTATE_GUARD_BITS - 1);
    FixedVec2::new(
        (fixed_mul(x, CORDIC_GAIN_INV) + half) >> ROTATE_GUARD_BITS,
        (fixed_mul(y, CORDIC_GAIN_INV) + half) >> ROTATE_GUARD_BITS,
    )
}

/// Unit vector pointing at `angle` radians.
pub fn from_angle(angle: Fixed) -> FixedVec2 {
    rotate(FixedVec2::new(FIXED_ONE, 0), angle)
}

/// Unit vector from `from` toward `to` (ZERO when they coincide).
pub fn bearing(from: FixedVec2, to: FixedVec2) -> FixedVec2 {
    (to - from).normalize()
}

/// Signed angle from `a` to `b` in `(-π, π]`.
pub fn angle_between(a: FixedVec2, b: FixedVec2) -> Fixed {
    // Normalising first keeps the cross/dot products in range
    let (a, b) = (a.normalize(), b.normalize());
    atan2(a.cross(b), a.dot(b))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    const ANGLE_TOLERANCE: Fixed = 48;

    fn close(a: Fixed, b: Fixed, tol: Fixed) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_segment_intersection_crossing() {
        let p = segment_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(10, 10),
            FixedVec2::from_ints(0, 10),
            FixedVec2::from_ints(10, 0),
        )
        .unwrap();
        assert_eq!(p, FixedVec2::from_ints(5, 5));
    }

    #[test]
    fn test_segment_intersection_misses() {
        // Parallel
        assert!(segment_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(10, 0),
            FixedVec2::from_ints(0, 1),
            FixedVec2::from_ints(10, 1),
        )
        .is_none());
        // Lines cross outside the segments
        assert!(segment_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(1, 1),
            FixedVec2::from_ints(0, 10),
            FixedVec2::from_ints(10, 0),
        )
        .is_none());
    }

    #[test]
    fn test_segment_circle_entry() {
        let t = segment_circle_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(10, 0),
            FixedVec2::from_ints(6, 0),
            to_fixed(2.0),
        )
        .unwrap();
        // Enters at x = 4
        assert!(close(t, to_fixed(0.4), 2));
    }

    #[test]
    fn test_segment_circle_starts_inside() {
        let t = segment_circle_intersection(
            FixedVec2::from_ints(5, 0),
            FixedVec2::from_ints(10, 0),
            FixedVec2::from_ints(5, 1),
            to_fixed(2.0),
        );
        assert_eq!(t, Some(0));
    }

    #[test]
    fn test_segment_circle_miss() {
        assert!(segment_circle_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(10, 0),
            FixedVec2::from_ints(5, 5),
            to_fixed(2.0),
        )
        .is_none());
        // Circle beyond the end of the segment
        assert!(segment_circle_intersection(
            FixedVec2::from_ints(0, 0),
            FixedVec2::from_ints(10, 0),
            FixedVec2::from_ints(20, 0),
            to_fixed(2.0),
        )
        .is_none());
    }

    #[test]
    fn test_segment_circle_tiny_step() {
        // A crawl of 0.001 units still registers when it crosses the edge
        let center = FixedVec2::from_ints(0, 0);
        let p0 = FixedVec2::new(to_fixed(2.0005), 0);
        let p1 = FixedVec2::new(to_fixed(1.9995), 0);
        assert!(segment_circle_intersection(p0, p1, center, to_fixed(2.0)).is_some());
    }

    #[test]
    fn test_point_segment_distance() {
        let a = FixedVec2::from_ints(0, 0);
        let b = FixedVec2::from_ints(10, 0);
        assert_eq!(point_segment_distance_squared(FixedVec2::from_ints(5, 3), a, b), to_fixed(9.0));
        assert_eq!(point_segment_distance_squared(FixedVec2::from_ints(13, 4), a, b), to_fixed(25.0));
        assert_eq!(point_segment_distance_squared(FixedVec2::from_ints(1, 1), a, a), to_fixed(2.0));
    }

    #[test]
    fn test_atan2_quadrants() {
        let one = FIXED_ONE;
        assert!(close(atan2(0, one), 0, ANGLE_TOLERANCE));
        assert!(close(atan2(one, one), FIXED_PI / 4, ANGLE_TOLERANCE));
        assert!(close(atan2(one, 0), FIXED_HALF_PI, ANGLE_TOLERANCE));
        assert!(close(atan2(one, -one), 3 * FIXED_PI / 4, ANGLE_TOLERANCE));
        assert!(close(atan2(-one, -one), -3 * FIXED_PI / 4, ANGLE_TOLERANCE));
        assert!(close(atan2(-one, 0), -FIXED_HALF_PI, ANGLE_TOLERANCE));
        assert!(close(atan2(0, -one).abs(), FIXED_PI, ANGLE_TOLERANCE));
        assert_eq!(atan2(0, 0), 0);
    }

    #[test]
    fn test_atan2_scale_invariant() {
        let small = atan2(to_fixed(0.01), to_fixed(0.02));
        let large = atan2(to_fixed(10000.0), to_fixed(20000.0));
        assert!(close(small, large, ANGLE_TOLERANCE));
    }

    #[test]
    fn test_rotate_quarter_turns() {
        let v = FixedVec2::new(FIXED_ONE, 0);
        let up = rotate(v, FIXED_HALF_PI);
        assert!(close(up.x, 0, 64) && close(up.y, FIXED_ONE, 64));

        let back = rotate(v, FIXED_PI);
        assert!(close(back.x, -FIXED_ONE, 64) && close(back.y, 0, 64));

        let down = rotate(v, -FIXED_HALF_PI);
        assert!(close(down.x, 0, 64) && close(down.y, -FIXED_ONE, 64));
    }

    #[test]
    fn test_rotate_then_atan2_round_trip() {
        for deg in [-170i64, -95, -45, -10, 0, 10, 30, 89, 120, 179] {
            let angle = deg * FIXED_PI / 180;
            let dir = from_angle(angle);
            assert!(close(dir.length(), FIXED_ONE, 128), "length at {deg}");
            assert!(close(atan2(dir.y, dir.x), angle, 2 * ANGLE_TOLERANCE), "angle at {deg}");
        }
    }

    #[test]
    fn test_bearing_and_angle_between() {
        let b = bearing(FixedVec2::from_ints(0, 0), FixedVec2::from_ints(0, 5));
        assert_eq!(b, FixedVec2::new(0, FIXED_ONE));

        let a = angle_between(FixedVec2::from_ints(1, 0), FixedVec2::from_ints(0, 1));
        assert!(close(a, FIXED_HALF_PI, ANGLE_TOLERANCE));
        let a = angle_between(FixedVec2::from_ints(0, 1), FixedVec2::from_ints(1, 0));
        assert!(close(a, -FIXED_HALF_PI, ANGLE_TOLERANCE));
    }

    #[test]
    fn test_wrap_angle() {
        assert_eq!(wrap_angle(FIXED_TWO_PI), 0);
        assert_eq!(wrap_angle(-FIXED_PI), FIXED_PI);
        assert!(close(wrap_angle(3 * FIXED_PI / 2), -FIXED_HALF_PI, 2));
    }
}
