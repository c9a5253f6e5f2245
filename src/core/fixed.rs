//! Q48.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the billiards simulation.
//! All operations inside the physics loop use integer arithmetic only.
//!
//! ## Format: Q48.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q48.16 (64-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][ 47 integer bits ][FFFFFFFFFFFFFFFF]                   │
//! │                         └──── 16 bits ───┘                  │
//! │                                                             │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! │  Products and quotients widen to i128                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Table coordinates scale with `adjustmentScale` (a full-size table at
//! scale 1.0 is 60000 units wide), which is why the integer part is wider
//! than a Q16.16 layout would allow.
//!
//! ## Float boundaries
//!
//! Floats only appear where data enters or leaves the simulation. Values
//! entering are rounded to [`INPUT_DECIMALS`] places before conversion,
//! values leaving toward clients are rounded to [`OUTPUT_DECIMALS`] places.

/// Q48.16 fixed-point number stored as i64.
pub type Fixed = i64;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

/// π = 3.14159265 * 65536 = 205887
pub const FIXED_PI: Fixed = 205887;

/// 2π = 6.28318531 * 65536 = 411775
pub const FIXED_TWO_PI: Fixed = 411775;

/// π/2 = 1.57079633 * 65536 = 102944
pub const FIXED_HALF_PI: Fixed = 102944;

/// √3/2 = 0.8660254 * 65536 = 56756
pub const FIXED_SQRT3_HALF: Fixed = 56756;

/// Decimal places kept on floats entering the simulation.
pub const INPUT_DECIMALS: u32 = 4;

/// Decimal places kept on floats sent to clients.
pub const OUTPUT_DECIMALS: u32 = 3;

// =============================================================================
// FLOAT BOUNDARY
// =============================================================================

/// Round a float to a fixed number of decimal places.
///
/// Non-finite input is returned unchanged so callers can reject it.
#[inline]
pub fn round_places(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Convert a float to fixed-point.
///
/// The float is rounded to [`INPUT_DECIMALS`] places first so that the same
/// decimal payload always yields the same fixed value.
///
/// # Example
/// ```
/// use breakshot::core::fixed::{to_fixed, FIXED_ONE};
/// assert_eq!(to_fixed(2.5), FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub fn to_fixed(f: f64) -> Fixed {
    (round_places(f, INPUT_DECIMALS) * FIXED_ONE as f64).round() as Fixed
}

/// Convert fixed-point to float for display and client payloads.
///
/// Never feed the result back into the simulation without going through
/// [`to_fixed`].
#[inline]
pub fn to_float(f: Fixed) -> f64 {
    f as f64 / FIXED_ONE as f64
}

/// Convert fixed-point to a float rounded to [`OUTPUT_DECIMALS`] places.
#[inline]
pub fn to_output(f: Fixed) -> f64 {
    round_places(to_float(f), OUTPUT_DECIMALS)
}

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// `a * b`, computed in i128 and floored back to Q48.16.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i128) * (b as i128);
    (wide >> FIXED_SCALE) as Fixed
}

/// `a / b` in i128, truncated toward zero. Division by zero yields 0.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return 0;
    }
    let wide = (a as i128) << FIXED_SCALE;
    (wide / b as i128) as Fixed
}

/// Floor of the square root of `n` (Newton iteration).
#[inline]
pub(crate) fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let shift = (128 - n.leading_zeros()).div_ceil(2);
    let mut x = 1u128 << shift;
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Square root of a fixed-point number.
///
/// Computed as the exact integer root of `x << 16`, so the result is the
/// floor of the true root at fixed precision. Non-positive input returns 0.
#[inline]
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    if x <= 0 {
        return 0;
    }
    isqrt((x as u128) << FIXED_SCALE) as Fixed
}

/// Absolute value; `Fixed::MIN` wraps to itself instead of panicking.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    x.wrapping_abs()
}

/// Clamp into `[min, max]`. Unlike `i64::clamp` this never panics; an
/// inverted range yields `min`.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    value.min(max).max(min)
}

// =============================================================================
// TESTS
// =============================================================================
