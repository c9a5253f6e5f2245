//! Table-space vectors
//!
//! [`FixedVec2`] carries ball positions, velocities and aim directions in
//! engine units. Components are Q48.16, so every operation is exact integer
//! arithmetic and replays agree bit for bit.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use super::fixed::{
    fixed_clamp, fixed_div, fixed_mul, fixed_sqrt, to_fixed, to_float, to_output, Fixed,
    FIXED_SCALE,
};

/// Point or direction on the table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// Horizontal component, along the long rails
    pub x: Fixed,
    /// Vertical component, along the short rails
    pub y: Fixed,
}

/// Mirror line for rail reflections. Rails are axis aligned, so a mirror is
/// always `x = c` or `y = c`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisLine {
    /// `x = value` (left and right rails)
    Vertical(Fixed),
    /// `y = value` (top and bottom rails)
    Horizontal(Fixed),
}

impl FixedVec2 {
    /// Origin, also the resting velocity
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// From raw fixed-point components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// From whole engine units.
    #[inline]
    pub const fn from_ints(x: i64, y: i64) -> Self {
        Self::new(x << FIXED_SCALE, y << FIXED_SCALE)
    }

    /// From boundary floats. Each component is rounded to 4 decimals
    /// before conversion.
    #[inline]
    pub fn from_floats(x: f64, y: f64) -> Self {
        Self::new(to_fixed(x), to_fixed(y))
    }

    #[inline]
    fn map(self, f: impl Fn(Fixed) -> Fixed) -> Self {
        Self::new(f(self.x), f(self.y))
    }

    /// Multiply both components by `k`.
    #[inline]
    pub fn scale(self, k: Fixed) -> Self {
        self.map(|c| fixed_mul(c, k))
    }

    /// Divide both components by `k`.
    #[inline]
    pub fn div_scalar(self, k: Fixed) -> Self {
        self.map(|c| fixed_div(c, k))
    }

    /// `x*ox + y*oy`.
    #[inline]
    pub fn dot(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.x).wrapping_add(fixed_mul(self.y, other.y))
    }

    /// z of the 3D cross product; positive when `other` turns
    /// counter-clockwise from `self`.
    #[inline]
    pub fn cross(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.y).wrapping_sub(fixed_mul(self.y, other.x))
    }

    /// Squared magnitude. Contact tests compare against squared radii.
    #[inline]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Magnitude.
    #[inline]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Squared distance between two points.
    #[inline]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Distance between two points.
    #[inline]
    pub fn distance(self, other: Self) -> Fixed {
        (self - other).length()
    }

    /// Unit vector in the same direction, or [`ZERO`](Self::ZERO) for a
    /// zero-length input.
    #[inline]
    pub fn normalize(self) -> Self {
        match self.length() {
            0 => Self::ZERO,
            len => self.div_scalar(len),
        }
    }

    /// Quarter turn counter-clockwise.
    #[inline]
    pub fn perpendicular(self) -> Self {
        Self::new(self.y.wrapping_neg(), self.x)
    }

    /// Point at fraction `t` of the way to `other` (`t` in Q48.16).
    #[inline]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        self + (other - self).scale(t)
    }

    /// Clamp each component independently into `[min, max]`.
    #[inline]
    pub fn clamp_to_rect(self, min: Self, max: Self) -> Self {
        Self::new(
            fixed_clamp(self.x, min.x, max.x),
            fixed_clamp(self.y, min.y, max.y),
        )
    }

    /// Inclusive bounds check.
    #[inline]
    pub fn is_within(self, min: Self, max: Self) -> bool {
        (min.x..=max.x).contains(&self.x) && (min.y..=max.y).contains(&self.y)
    }

    /// Mirror image across a rail line.
    #[inline]
    pub fn reflect_across(self, line: AxisLine) -> Self {
        match line {
            AxisLine::Vertical(c) => Self::new(2 * c - self.x, self.y),
            AxisLine::Horizontal(c) => Self::new(self.x, 2 * c - self.y),
        }
    }

    /// Unrounded floats, for logs and benchmarks.
    #[inline]
    pub fn to_floats(self) -> (f64, f64) {
        (to_float(self.x), to_float(self.y))
    }

    /// Floats rounded to 3 decimals, as sent to clients.
    #[inline]
    pub fn to_output(self) -> [f64; 2] {
        [to_output(self.x), to_output(self.y)]
    }
}

impl Add for FixedVec2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_add(rhs.x), self.y.wrapping_add(rhs.y))
    }
}

impl Sub for FixedVec2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_sub(rhs.x), self.y.wrapping_sub(rhs.y))
    }
}

impl Neg for FixedVec2 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        self.map(i64::wrapping_neg)
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "Vec2({:.4}, {:.4})", x, y)
    }
}

impl fmt::Display for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y] = self.to_output();
        write!(f, "({:.3}, {:.3})", x, y)
    }
}

// =============================================================================
// TESTS
// =============================================================================
