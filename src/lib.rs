//! # Breakshot Match Server
//!
//! Authoritative 8-ball simulation, rules, replay verification and live
//! match synchronization for head-to-head billiards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BREAKSHOT SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                 │
//! │  ├── fixed.rs    - Q48.16 fixed-point arithmetic            │
//! │  ├── vec2.rs     - 2D vector with fixed-point               │
//! │  ├── geometry.rs - Intersections, reflection, CORDIC        │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG          │
//! │  └── hash.rs     - State hashing for verification           │
//! │                                                             │
//! │  game/           - Simulation and rules (deterministic)     │
//! │  ├── table.rs    - Table, pockets, physical constants       │
//! │  ├── state.rs    - Balls, sides, groups, rules state        │
//! │  ├── input.rs    - Shot input and validation                │
//! │  ├── collision.rs- Ball, cushion and pocket contacts        │
//! │  ├── tick.rs     - Shot simulation loop                     │
//! │  ├── rules.rs    - 8-ball rules state machine               │
//! │  └── engine.rs   - Rack, apply shot, snapshots              │
//! │                                                             │
//! │  replay/         - Snapshots, shot logs, verification       │
//! │  ai/             - Candidate shots and sandbox search       │
//! │                                                             │
//! │  network/        - Live matches (non-deterministic)         │
//! │  ├── sync.rs     - Shot pipeline, AI turns, expiry          │
//! │  ├── session.rs  - Live match store                         │
//! │  ├── mapping.rs  - Client <-> engine coordinates            │
//! │  ├── protocol.rs - Wire messages and sync events            │
//! │  └── server.rs   - WebSocket gateway                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `game/`, `replay/` and `ai/` modules are deterministic:
//! - No floating-point arithmetic in the simulation
//! - Floats are rounded to 4 decimals before entering it
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given the same seed and shot log, a replay reproduces every state hash
//! of the live match.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod replay;
pub mod ai;
pub mod network;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use core::vec2::FixedVec2;
pub use game::{Engine, EngineError, RawShot, ShotInput, ShotResult, Side, TableConfig, ValidationError};
pub use replay::{replay, MatchMetadata, ShotLogEntry, Snapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
