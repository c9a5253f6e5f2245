//! Table Configuration
//!
//! Physical constants of the table, all derived once from `adjustmentScale`.
//!
//! ```text
//!  (0,H) ●───────────────●───────────────● (W,H)
//!        │               side            │
//!        │   head spot              foot │
//!        │      ●(W/4,H/2)     (3W/4,H/2)●  ◄ rack apex
//!        │                               │
//!  (0,0) ●───────────────●───────────────● (W,0)
//!         corner pockets at the corners, side pockets mid-rail
//! ```
//!
//! Base dimensions are expressed in "table units" at scale 1.0 and
//! multiplied by the scale before conversion to fixed-point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_mul, to_fixed};
use crate::core::hash::StateHasher;
use crate::core::vec2::{AxisLine, FixedVec2};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of balls on the table (cue + 15 object balls).
pub const BALL_COUNT: usize = 16;

/// Cue ball id
pub const CUE_BALL: u8 = 0;

/// Eight ball id
pub const EIGHT_BALL: u8 = 8;

/// Physics steps per simulated second
pub const STEP_RATE: u32 = 300;

/// Step duration: 65536 / 300 = 218.45 → 218
pub const STEP_DT: Fixed = 218;

/// Step budget per shot (12 simulated seconds)
pub const MAX_STEPS: u32 = 12 * STEP_RATE;

/// Maximum shot power in power units (scale independent)
pub const MAX_POWER: Fixed = 6000 * FIXED_ONE;

/// Smallest accepted adjustment scale
pub const MIN_SCALE: f64 = 0.001;

/// Largest accepted adjustment scale
pub const MAX_SCALE: f64 = 1.0;

/// Scale used when a session does not specify one
pub const DEFAULT_SCALE: f64 = 0.02;

const BASE_WIDTH: f64 = 100.0 * 600.0;
const BASE_HEIGHT: f64 = 50.0 * 600.0;
const BASE_BALL_RADIUS: f64 = 1.125 * 600.0;
const BASE_CORNER_POCKET: f64 = 2.0 * 600.0;
const BASE_SIDE_POCKET: f64 = 1.8 * 600.0;
const BASE_ROLLING_DECEL: f64 = 7500.0;
const BASE_STOP_SPEED: f64 = 100.0;
const BASE_POWER_TO_SPEED: f64 = 30.0;

const CUSHION_RESTITUTION: f64 = 0.8;
const BALL_RESTITUTION: f64 = 0.96;
const DRAG: f64 = 0.35;

/// Convert a step count to simulated milliseconds.
#[inline]
pub fn steps_to_ms(steps: u32) -> u64 {
    steps as u64 * 1000 / STEP_RATE as u64
}

/// Table construction errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// Scale is not finite or outside `[MIN_SCALE, MAX_SCALE]`
    #[error("adjustment scale {0} must be finite and within [0.001, 1.0]")]
    InvalidScale(f64),
}

// =============================================================================
// POCKETS
// =============================================================================

/// Pocket placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketKind {
    /// One of the four corners
    Corner,
    /// Middle of a long rail
    Side,
}

/// A pocket: capture circle on the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pocket {
    /// Pocket index (0..6)
    pub id: u8,
    /// Corner or side
    pub kind: PocketKind,
    /// Center point
    pub center: FixedVec2,
    /// Capture radius
    pub radius: Fixed,
}

// =============================================================================
// TABLE CONFIG
// =============================================================================

/// Immutable per-match table configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Scale every dimension was derived from
    pub adjustment_scale: f64,
    /// Playing surface width
    pub width: Fixed,
    /// Playing surface height
    pub height: Fixed,
    /// Ball radius
    pub ball_radius: Fixed,
    /// Maximum shot power
    pub max_power: Fixed,
    /// Fraction of normal velocity kept after a cushion
    pub cushion_restitution: Fixed,
    /// Ball-ball restitution
    pub ball_restitution: Fixed,
    /// Constant rolling deceleration (units/s²)
    pub rolling_decel: Fixed,
    /// Velocity-proportional drag (1/s)
    pub drag: Fixed,
    /// Speeds below this are zeroed (units/s)
    pub stop_speed: Fixed,
    /// Power unit → units/s
    pub power_to_speed: Fixed,
    /// Six pockets: corners first (BL, BR, TL, TR), then sides (bottom, top)
    pub pockets: Vec<Pocket>,
    /// Cue ball spot
    pub head_spot: FixedVec2,
    /// Rack apex / eight ball re-spot
    pub foot_spot: FixedVec2,
}

impl TableConfig {
    /// Derive the table from an adjustment scale.
    pub fn from_scale(scale: f64) -> Result<Self, TableError> {
        if !scale.is_finite() || !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(TableError::InvalidScale(scale));
        }

        let width = to_fixed(BASE_WIDTH * scale);
        let height = to_fixed(BASE_HEIGHT * scale);
        let corner = to_fixed(BASE_CORNER_POCKET * scale);
        let side = to_fixed(BASE_SIDE_POCKET * scale);

        let pocket = |id: u8, kind: PocketKind, x: Fixed, y: Fixed| Pocket {
            id,
            kind,
            center: FixedVec2::new(x, y),
            radius: if kind == PocketKind::Corner { corner } else { side },
        };

        let pockets = vec![
            pocket(0, PocketKind::Corner, 0, 0),
            pocket(1, PocketKind::Corner, width, 0),
            pocket(2, PocketKind::Corner, 0, height),
            pocket(3, PocketKind::Corner, width, height),
            pocket(4, PocketKind::Side, width / 2, 0),
            pocket(5, PocketKind::Side, width / 2, height),
        ];

        Ok(Self {
            adjustment_scale: scale,
            width,
            height,
            ball_radius: to_fixed(BASE_BALL_RADIUS * scale),
            max_power: MAX_POWER,
            cushion_restitution: to_fixed(CUSHION_RESTITUTION),
            ball_restitution: to_fixed(BALL_RESTITUTION),
            rolling_decel: to_fixed(BASE_ROLLING_DECEL * scale),
            drag: to_fixed(DRAG),
            stop_speed: to_fixed(BASE_STOP_SPEED * scale),
            power_to_speed: to_fixed(BASE_POWER_TO_SPEED * scale),
            pockets,
            head_spot: FixedVec2::new(width / 4, height / 2),
            foot_spot: FixedVec2::new(width * 3 / 4, height / 2),
        })
    }

    /// Lowest legal ball-center coordinate.
    #[inline]
    pub fn ball_min(&self) -> FixedVec2 {
        FixedVec2::new(self.ball_radius, self.ball_radius)
    }

    /// Highest legal ball-center coordinate.
    #[inline]
    pub fn ball_max(&self) -> FixedVec2 {
        FixedVec2::new(self.width - self.ball_radius, self.height - self.ball_radius)
    }

    /// Whether a ball centered here is fully inside the rails.
    #[inline]
    pub fn contains_ball(&self, center: FixedVec2) -> bool {
        center.is_within(self.ball_min(), self.ball_max())
    }

    /// Pocket whose capture circle contains the point, if any.
    pub fn pocket_at(&self, point: FixedVec2) -> Option<&Pocket> {
        self.pockets.iter().find(|p| {
            point.distance_squared(p.center) <= fixed_mul(p.radius, p.radius)
        })
    }

    /// Launch speed for a shot power.
    #[inline]
    pub fn launch_speed(&self, power: Fixed) -> Fixed {
        fixed_mul(power, self.power_to_speed)
    }

    /// Rolling deceleration applied per step.
    #[inline]
    pub fn decel_per_step(&self) -> Fixed {
        fixed_mul(self.rolling_decel, STEP_DT)
    }

    /// Velocity multiplier for one step of drag.
    #[inline]
    pub fn drag_factor_per_step(&self) -> Fixed {
        FIXED_ONE - fixed_mul(self.drag, STEP_DT)
    }

    /// The four cushion lines a ball center bounces off.
    pub fn rail_lines(&self) -> [AxisLine; 4] {
        let min = self.ball_min();
        let max = self.ball_max();
        [
            AxisLine::Horizontal(min.y),
            AxisLine::Horizontal(max.y),
            AxisLine::Vertical(min.x),
            AxisLine::Vertical(max.x),
        ]
    }

    /// Hash every field in a fixed order.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.adjustment_scale.to_bits());
        hasher.update_fixed(self.width);
        hasher.update_fixed(self.height);
        hasher.update_fixed(self.ball_radius);
        hasher.update_fixed(self.max_power);
        hasher.update_fixed(self.cushion_restitution);
        hasher.update_fixed(self.ball_restitution);
        hasher.update_fixed(self.rolling_decel);
        hasher.update_fixed(self.drag);
        hasher.update_fixed(self.stop_speed);
        hasher.update_fixed(self.power_to_speed);
        hasher.update_u8(self.pockets.len() as u8);
        for pocket in &self.pockets {
            hasher.update_u8(pocket.id);
            hasher.update_vec2(pocket.center);
            hasher.update_fixed(pocket.radius);
        }
        hasher.update_vec2(self.head_spot);
        hasher.update_vec2(self.foot_spot);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scale_dimensions() {
        let table = TableConfig::from_scale(DEFAULT_SCALE).unwrap();
        assert_eq!(table.width, to_fixed(1200.0));
        assert_eq!(table.height, to_fixed(600.0));
        assert_eq!(table.ball_radius, to_fixed(13.5));
        assert_eq!(table.max_power, MAX_POWER);
        assert_eq!(table.pockets.len(), 6);
        assert_eq!(table.head_spot, FixedVec2::new(to_fixed(300.0), to_fixed(300.0)));
        assert_eq!(table.foot_spot, FixedVec2::new(to_fixed(900.0), to_fixed(300.0)));
    }

    #[test]
    fn test_invalid_scales_rejected() {
        for scale in [0.0, -1.0, 0.0009, 1.5, f64::NAN, f64::INFINITY] {
            assert!(TableConfig::from_scale(scale).is_err(), "{scale}");
        }
        assert!(TableConfig::from_scale(MIN_SCALE).is_ok());
        assert!(TableConfig::from_scale(MAX_SCALE).is_ok());
    }

    #[test]
    fn test_pocket_radii() {
        let table = TableConfig::from_scale(DEFAULT_SCALE).unwrap();
        for pocket in &table.pockets {
            match pocket.kind {
                PocketKind::Corner => assert_eq!(pocket.radius, to_fixed(24.0)),
                PocketKind::Side => assert_eq!(pocket.radius, to_fixed(21.6)),
            }
        }
        assert!(table.pocket_at(FixedVec2::ZERO).is_some());
        assert!(table.pocket_at(table.head_spot).is_none());
    }

    #[test]
    fn test_max_step_travel_below_radius() {
        // A ball at full power moves less than a radius per step, so
        // discrete collision checks cannot skip past a ball or a rail.
        for scale in [MIN_SCALE, DEFAULT_SCALE, 0.5, MAX_SCALE] {
            let table = TableConfig::from_scale(scale).unwrap();
            let per_step = fixed_mul(table.launch_speed(table.max_power), STEP_DT);
            assert!(per_step < table.ball_radius, "scale {scale}");
        }
    }

    #[test]
    fn test_steps_to_ms() {
        assert_eq!(steps_to_ms(300), 1000);
        assert_eq!(steps_to_ms(MAX_STEPS), 12_000);
        assert_eq!(steps_to_ms(1), 3);
    }

    #[test]
    fn test_table_is_serializable() {
        let table = TableConfig::from_scale(DEFAULT_SCALE).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("adjustmentScale"));
        let back: TableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
