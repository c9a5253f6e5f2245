//! AI Opponent
//!
//! Shot search over disposable engine copies.
//!
//! ## Module Structure
//!
//! - `candidates`: Direct, bank and random candidate generation
//! - `search`: Difficulty curve, sandbox simulation and scoring

pub mod candidates;
pub mod search;

pub use search::{accuracy, attempt_budget, choose_shot, AiError};
