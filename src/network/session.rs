//! Live Match Sessions
//!
//! One live engine per match, held in process memory behind a per-match
//! exclusive lock. Human shots, AI turns, timeouts and resignations all
//! take that lock, so no two shots for a match are ever in flight.
//!
//! ```text
//!   EngineStore ──► MatchId ──► Arc<Mutex<LiveMatch>>
//!                                  ├─ Engine (authoritative)
//!                                  ├─ MatchMetadata (+ shot log)
//!                                  ├─ status, seats, clocks
//!                                  └─ broadcast token
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::game::engine::Engine;
use crate::game::state::Side;
use crate::network::protocol::MatchId;
use crate::replay::metadata::MatchMetadata;

/// Lifecycle of a live match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Accepting shots
    Active,
    /// Result decided; further completions are no-ops
    Completed,
    /// Internal consistency failure; the match no longer accepts shots
    Faulted,
}

/// Who plays a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seat {
    /// A connected player
    Human,
    /// The server's AI
    Ai {
        /// Difficulty in 1..=100
        difficulty: u8,
    },
}

/// A match being played.
#[derive(Debug)]
pub struct LiveMatch {
    /// Match
    pub id: MatchId,
    /// The authoritative engine
    pub engine: Engine,
    /// Configuration and shot log
    pub metadata: MatchMetadata,
    /// Lifecycle
    pub status: MatchStatus,
    /// Player one's seat
    pub p1: Seat,
    /// Player two's seat
    pub p2: Seat,
    /// Start of the match clock
    pub started_at: DateTime<Utc>,
    /// Last accepted shot (or the start)
    pub last_activity: DateTime<Utc>,
    /// An AI turn task is scheduled
    pub ai_pending: bool,
    token: Arc<AtomicU64>,
}

impl LiveMatch {
    /// Live match from an engine and its metadata. The AI, when present,
    /// plays p2.
    pub fn new(id: MatchId, engine: Engine, metadata: MatchMetadata, started_at: DateTime<Utc>) -> Self {
        let p2 = match metadata.ai_difficulty {
            Some(difficulty) => Seat::Ai { difficulty },
            None => Seat::Human,
        };
        Self {
            id,
            engine,
            metadata,
            status: MatchStatus::Active,
            p1: Seat::Human,
            p2,
            started_at,
            last_activity: started_at,
            ai_pending: false,
            token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seat for a side.
    pub fn seat(&self, side: Side) -> Seat {
        match side {
            Side::P1 => self.p1,
            Side::P2 => self.p2,
        }
    }

    /// Whether the match still accepts shots.
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    /// AI difficulty of the side on turn, if the AI is on turn.
    pub fn ai_on_turn(&self) -> Option<u8> {
        if !self.is_active() || self.engine.is_over() {
            return None;
        }
        match self.seat(self.engine.turn()) {
            Seat::Ai { difficulty } => Some(difficulty),
            Seat::Human => None,
        }
    }

    /// Current broadcast token.
    pub fn token(&self) -> u64 {
        self.token.load(Ordering::SeqCst)
    }

    /// Invalidate in-flight frame streams; returns the new token.
    pub fn bump_token(&self) -> u64 {
        self.token.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Shared handle for frame streams to compare against.
    pub fn token_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.token)
    }
}

/// Shared, lockable live match.
pub type SharedMatch = Arc<Mutex<LiveMatch>>;

/// Where live matches are kept.
pub trait EngineStore: Send + Sync {
    /// Live match by id.
    fn get(&self, id: &MatchId) -> Option<SharedMatch>;

    /// Store a match unless one is already there; returns the stored entry.
    fn insert(&self, id: MatchId, entry: SharedMatch) -> SharedMatch;

    /// Drop a match from memory.
    fn remove(&self, id: &MatchId) -> Option<SharedMatch>;

    /// Ids of all live matches.
    fn ids(&self) -> Vec<MatchId>;
}

/// Process-memory engine store.
#[derive(Default)]
pub struct InMemoryEngineStore {
    matches: RwLock<BTreeMap<MatchId, SharedMatch>>,
}

impl InMemoryEngineStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.matches.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no match is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EngineStore for InMemoryEngineStore {
    fn get(&self, id: &MatchId) -> Option<SharedMatch> {
        self.matches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn insert(&self, id: MatchId, entry: SharedMatch) -> SharedMatch {
        let mut matches = self.matches.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(matches.entry(id).or_insert(entry))
    }

    fn remove(&self, id: &MatchId) -> Option<SharedMatch> {
        self.matches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    fn ids(&self) -> Vec<MatchId> {
        self.matches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
