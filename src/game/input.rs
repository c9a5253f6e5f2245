//! Shot Input Validation
//!
//! The only door through which floats enter the simulation. Every payload
//! is checked and rounded to 4 decimals before it becomes fixed-point, and
//! all checks happen before the engine mutates anything.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Fixed, FIXED_ONE, to_fixed, to_float, round_places, INPUT_DECIMALS};
use crate::core::vec2::FixedVec2;
use crate::game::state::Side;

/// Allowed deviation of the direction length from 1.0.
const DIRECTION_TOLERANCE: f64 = 0.01;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a cue-ball placement is illegal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementIssue {
    /// Outside the rails
    OutOfBounds,
    /// Overlaps an object ball
    Overlapping,
    /// Inside a pocket's capture circle
    InPocket,
}

/// Rejected shot or placement. Nothing is mutated when this is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Not this side's turn
    #[error("not {actual}'s turn (expected {expected})")]
    WrongTurn {
        /// Side whose turn it is
        expected: Side,
        /// Side that tried to shoot
        actual: Side,
    },

    /// The match has already been decided
    #[error("match is over")]
    MatchOver,

    /// A numeric field was NaN or infinite
    #[error("field {0} is not a finite number")]
    NonFinite(&'static str),

    /// Power outside `[0, max]`
    #[error("power {power} outside [0, {max}]")]
    PowerOutOfRange {
        /// Requested power
        power: f64,
        /// Table maximum
        max: f64,
    },

    /// Direction is not a unit vector
    #[error("direction length {0} is not within 1 ± 0.01")]
    MalformedDirection(f64),

    /// Screw or english outside `[-1, 1]`
    #[error("{field} {value} outside [-1, 1]")]
    SpinOutOfRange {
        /// "screw" or "english"
        field: &'static str,
        /// Requested value
        value: f64,
    },

    /// Ball in hand but no cue-ball position supplied
    #[error("cue ball position required while ball in hand")]
    PlacementRequired,

    /// A cue-ball position was supplied without ball in hand
    #[error("cue ball may only be placed with ball in hand")]
    PlacementNotAllowed,

    /// The requested cue-ball position is illegal
    #[error("illegal cue ball placement: {0:?}")]
    IllegalPlacement(PlacementIssue),

    /// Capture options with a zero stride or frame cap
    #[error("capture stride and max frames must both be at least 1")]
    InvalidCapture,
}

// =============================================================================
// SHOT INPUT
// =============================================================================

/// A validated shot in engine space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotInput {
    /// Unit direction of the cue
    pub direction: FixedVec2,
    /// Power in `[0, max_power]`
    pub power: Fixed,
    /// Cue-ball placement (ball in hand only)
    pub cue_ball_position: Option<FixedVec2>,
    /// Follow (+) or draw (-) in `[-1, 1]`
    pub screw: Fixed,
    /// Side spin in `[-1, 1]`
    pub english: Fixed,
}

/// Raw shot fields as they arrive from a client or a log entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawShot {
    /// Direction vector, expected to be unit length
    pub direction: [f64; 2],
    /// Shot power
    pub power: f64,
    /// Optional cue-ball placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_ball_position: Option<[f64; 2]>,
    /// Follow/draw
    #[serde(default)]
    pub screw: f64,
    /// Side spin
    #[serde(default)]
    pub english: f64,
}

impl RawShot {
    /// Same shot with every field rounded to 4 decimals.
    ///
    /// Shot logs store this form; `ShotInput::from_raw` of the rounded and
    /// the original payload are identical.
    pub fn rounded(&self) -> RawShot {
        let four = |v: f64| round_places(v, INPUT_DECIMALS);
        RawShot {
            direction: [four(self.direction[0]), four(self.direction[1])],
            power: four(self.power),
            cue_ball_position: self.cue_ball_position.map(|[x, y]| [four(x), four(y)]),
            screw: four(self.screw),
            english: four(self.english),
        }
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(round_places(value, INPUT_DECIMALS))
    } else {
        Err(ValidationError::NonFinite(field))
    }
}

fn spin(field: &'static str, value: f64) -> Result<Fixed, ValidationError> {
    let value = finite(field, value)?;
    if !(-1.0..=1.0).contains(&value) {
        return Err(ValidationError::SpinOutOfRange { field, value });
    }
    Ok(to_fixed(value))
}

impl ShotInput {
    /// Validate raw floats and convert them to engine space.
    ///
    /// The direction keeps its rounded components as given, so
    /// `from_raw(&input.to_raw())` returns `input` unchanged for any input
    /// this function produced. Shot logs rely on that.
    pub fn from_raw(raw: &RawShot, max_power: Fixed) -> Result<Self, ValidationError> {
        let dx = finite("direction.x", raw.direction[0])?;
        let dy = finite("direction.y", raw.direction[1])?;
        let power = finite("power", raw.power)?;

        let max = to_float(max_power);
        if !(0.0..=max).contains(&power) {
            return Err(ValidationError::PowerOutOfRange { power, max });
        }

        let length = (dx * dx + dy * dy).sqrt();
        if (length - 1.0).abs() > DIRECTION_TOLERANCE {
            return Err(ValidationError::MalformedDirection(length));
        }

        let cue_ball_position = match raw.cue_ball_position {
            Some([x, y]) => {
                let x = finite("cueBallPosition.x", x)?;
                let y = finite("cueBallPosition.y", y)?;
                Some(FixedVec2::from_floats(x, y))
            }
            None => None,
        };

        Ok(Self {
            direction: FixedVec2::from_floats(dx, dy),
            power: to_fixed(power),
            cue_ball_position,
            screw: spin("screw", raw.screw)?,
            english: spin("english", raw.english)?,
        })
    }

    /// A zero-power shot along +x, used when a turn times out.
    pub fn forfeit_turn() -> Self {
        Self {
            direction: FixedVec2::new(FIXED_ONE, 0),
            power: 0,
            cue_ball_position: None,
            screw: 0,
            english: 0,
        }
    }

    /// Back to raw floats (4 decimals) for shot logs.
    pub fn to_raw(&self) -> RawShot {
        let four = |v: Fixed| round_places(to_float(v), INPUT_DECIMALS);
        RawShot {
            direction: [four(self.direction.x), four(self.direction.y)],
            power: four(self.power),
            cue_ball_position: self.cue_ball_position.map(|p| [four(p.x), four(p.y)]),
            screw: four(self.screw),
            english: four(self.english),
        }
    }
}

// =============================================================================
// CAPTURE OPTIONS
// =============================================================================

/// Frame capture settings for a shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Record every `stride`-th step
    pub stride: u32,
    /// Upper bound on recorded frames
    pub max_frames: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        // 30 frames per simulated second, up to the full step budget
        Self {
            stride: 10,
            max_frames: 360,
        }
    }
}

impl CaptureOptions {
    /// Reject zero stride or zero frame cap.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stride == 0 || self.max_frames == 0 {
            return Err(ValidationError::InvalidCapture);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::table::MAX_POWER;
    use proptest::prelude::*;

    fn raw(direction: [f64; 2], power: f64) -> RawShot {
        RawShot {
            direction,
            power,
            ..RawShot::default()
        }
    }

    #[test]
    fn test_valid_shot() {
        let shot = ShotInput::from_raw(&raw([1.0, 0.0], 5000.0), MAX_POWER).unwrap();
        assert_eq!(shot.direction, FixedVec2::new(FIXED_ONE, 0));
        assert_eq!(shot.power, to_fixed(5000.0));
        assert_eq!(shot.cue_ball_position, None);
    }

    #[test]
    fn test_direction_tolerance() {
        assert!(ShotInput::from_raw(&raw([1.009, 0.0], 100.0), MAX_POWER).is_ok());
        assert!(matches!(
            ShotInput::from_raw(&raw([1.02, 0.0], 100.0), MAX_POWER),
            Err(ValidationError::MalformedDirection(_))
        ));
        assert!(matches!(
            ShotInput::from_raw(&raw([0.0, 0.0], 100.0), MAX_POWER),
            Err(ValidationError::MalformedDirection(_))
        ));
    }

    #[test]
    fn test_direction_keeps_rounded_components() {
        let shot = ShotInput::from_raw(&raw([0.6, 0.80501], 100.0), MAX_POWER).unwrap();
        assert_eq!(shot.direction, FixedVec2::from_floats(0.6, 0.805));
        assert_eq!(shot.to_raw().direction, [0.6, 0.805]);
    }

    #[test]
    fn test_power_bounds() {
        assert!(ShotInput::from_raw(&raw([1.0, 0.0], 0.0), MAX_POWER).is_ok());
        assert!(ShotInput::from_raw(&raw([1.0, 0.0], 6000.0), MAX_POWER).is_ok());
        assert!(matches!(
            ShotInput::from_raw(&raw([1.0, 0.0], 6000.1), MAX_POWER),
            Err(ValidationError::PowerOutOfRange { .. })
        ));
        assert!(matches!(
            ShotInput::from_raw(&raw([1.0, 0.0], -1.0), MAX_POWER),
            Err(ValidationError::PowerOutOfRange { .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            ShotInput::from_raw(&raw([f64::NAN, 0.0], 10.0), MAX_POWER),
            Err(ValidationError::NonFinite("direction.x"))
        );
        assert_eq!(
            ShotInput::from_raw(&raw([1.0, 0.0], f64::INFINITY), MAX_POWER),
            Err(ValidationError::NonFinite("power"))
        );
        let mut bad = raw([1.0, 0.0], 10.0);
        bad.cue_ball_position = Some([1.0, f64::NEG_INFINITY]);
        assert_eq!(
            ShotInput::from_raw(&bad, MAX_POWER),
            Err(ValidationError::NonFinite("cueBallPosition.y"))
        );
    }

    #[test]
    fn test_spin_bounds() {
        let mut shot = raw([1.0, 0.0], 10.0);
        shot.screw = -1.0;
        shot.english = 1.0;
        assert!(ShotInput::from_raw(&shot, MAX_POWER).is_ok());

        shot.english = 1.5;
        assert!(matches!(
            ShotInput::from_raw(&shot, MAX_POWER),
            Err(ValidationError::SpinOutOfRange { field: "english", .. })
        ));
    }

    #[test]
    fn test_to_raw_keeps_four_decimals() {
        let mut shot = raw([1.0, 0.0], 1234.56789);
        shot.screw = 0.33333;
        let input = ShotInput::from_raw(&shot, MAX_POWER).unwrap();
        let back = input.to_raw();
        assert_eq!(back.power, 1234.5679);
        assert_eq!(back.screw, 0.3333);
        // Feeding the logged form back in gives the same engine input
        assert_eq!(ShotInput::from_raw(&back, MAX_POWER).unwrap(), input);
    }

    #[test]
    fn test_rounded_payload_is_equivalent() {
        let mut shot = raw([0.70710678, 0.70710678], 4321.123456);
        shot.cue_ball_position = Some([100.123456, 200.98766]);
        let rounded = shot.rounded();
        assert_eq!(rounded.cue_ball_position, Some([100.1235, 200.9877]));
        assert_eq!(
            ShotInput::from_raw(&shot, MAX_POWER).unwrap(),
            ShotInput::from_raw(&rounded, MAX_POWER).unwrap()
        );
    }

    #[test]
    fn test_capture_validation() {
        assert!(CaptureOptions::default().validate().is_ok());
        assert!(CaptureOptions { stride: 0, max_frames: 5 }.validate().is_err());
        assert!(CaptureOptions { stride: 1, max_frames: 0 }.validate().is_err());
    }

    proptest! {
        /// Logging a shot and reading the log back is a fixed point.
        #[test]
        fn prop_log_round_trip_is_stable(
            angle in 0.0f64..std::f64::consts::TAU,
            stretch in 0.995f64..1.005,
            power in 0.0f64..6000.0,
            screw in -1.0f64..=1.0,
            english in -1.0f64..=1.0,
            place in proptest::option::of((0.0f64..1200.0, 0.0f64..600.0))
        ) {
            let shot = RawShot {
                direction: [angle.cos() * stretch, angle.sin() * stretch],
                power,
                cue_ball_position: place.map(|(x, y)| [x, y]),
                screw,
                english,
            };
            let input = ShotInput::from_raw(&shot, MAX_POWER).unwrap();
            let logged = input.to_raw();
            prop_assert_eq!(ShotInput::from_raw(&logged, MAX_POWER).unwrap(), input);
            prop_assert_eq!(ShotInput::from_raw(&logged, MAX_POWER).unwrap().to_raw(), logged);
        }
    }
}
