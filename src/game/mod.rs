//! Game Logic Module
//!
//! All table simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `table`: Table dimensions, pockets and physical constants
//! - `state`: Balls, sides, groups and rules state
//! - `input`: Shot validation at the float boundary
//! - `collision`: Ball, cushion and pocket contact resolution
//! - `tick`: Authoritative per-shot simulation loop
//! - `rules`: 8-ball rules state machine
//! - `engine`: Owns a table and applies shots
//! - `events`: Physical events for clients and replay checks

pub mod table;
pub mod state;
pub mod input;
pub mod collision;
pub mod tick;
pub mod rules;
pub mod engine;
pub mod events;

// Re-export key types
pub use engine::{Engine, EngineError};
pub use events::{ShotEvent, ShotEventKind};
pub use input::{CaptureOptions, RawShot, ShotInput, ValidationError};
pub use rules::{evaluate_shot, Foul, RulesError, RulesOutcome};
pub use state::{Ball, BallSet, Group, RulesPhase, RulesState, Side};
pub use table::{TableConfig, TableError};
pub use tick::{Frame, ShotResult};
