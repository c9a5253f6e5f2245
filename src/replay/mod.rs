//! Snapshot and Replay
//!
//! Everything needed to persist a match and prove its outcome:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    REPLAY SUBSYSTEM                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  snapshot.rs - Engine + rules state, hashing, bincode       │
//! │  shot_log.rs - Logged shots and their replay order          │
//! │  metadata.rs - Typed session metadata blob                  │
//! │  verify.rs   - Replay, claim verification, completion       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod snapshot;
pub mod shot_log;
pub mod metadata;
pub mod verify;

// Re-export key types
pub use metadata::{GameType, MatchMetadata, MetadataError};
pub use shot_log::{order_shot_log, ShotLogEntry, ShotTrigger};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
pub use verify::{
    replay, resolve_completion, verify_claim, ClaimField, ClaimedResult, CompletionReason,
    DivergenceReason, ReplayDivergence, ReplayOutcome, Resolution, Verification,
};
