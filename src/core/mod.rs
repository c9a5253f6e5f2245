//! Deterministic primitives shared by the engine, replay and AI.
//!
//! Nothing here touches floats except at the explicit boundary helpers in
//! [`fixed`], and nothing reads the clock.

pub mod fixed;
pub mod geometry;
pub mod hash;
pub mod rng;
pub mod vec2;

pub use fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use hash::{compute_state_hash, StateHash};
pub use rng::DeterministicRng;
pub use vec2::FixedVec2;
