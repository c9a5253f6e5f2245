//! External Collaborators
//!
//! Seams to the services around the match server. Persistence, result
//! publication and seat authorization all live elsewhere; the sync layer
//! only sees these traits. The in-memory implementations back the demo
//! binary and the tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::game::state::Side;
use crate::network::protocol::{MatchCompleted, MatchId};
use crate::replay::metadata::MatchMetadata;
use crate::replay::snapshot::Snapshot;

/// Repository failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    /// No session row for the match
    #[error("session {0} not found")]
    NotFound(MatchId),

    /// Backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// A stored session row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Match
    pub match_id: MatchId,
    /// Latest snapshot, absent before the first shot
    pub game_state: Option<Snapshot>,
    /// Metadata blob (see [`MatchMetadata`])
    pub metadata: serde_json::Value,
    /// When the match started
    pub started_at: DateTime<Utc>,
    /// Final result once completed
    pub result: Option<MatchCompleted>,
}

impl SessionRecord {
    /// Row for a match that has not been played yet.
    pub fn new(match_id: MatchId, metadata: &MatchMetadata, started_at: DateTime<Utc>) -> Self {
        Self {
            match_id,
            game_state: None,
            metadata: metadata.to_blob(),
            started_at,
            result: None,
        }
    }
}

/// Durable session storage.
pub trait SessionRepository: Send + Sync {
    /// Load a session row.
    fn load(&self, match_id: MatchId) -> Result<Option<SessionRecord>, RepositoryError>;

    /// Store the latest snapshot and metadata.
    fn save(&self, match_id: MatchId, snapshot: &Snapshot, metadata: &MatchMetadata) -> Result<(), RepositoryError>;

    /// Record the final result.
    fn mark_completed(&self, result: &MatchCompleted) -> Result<(), RepositoryError>;
}

/// Announces match results (prizes, notifications).
pub trait EventPublisher: Send + Sync {
    /// Publish a final result.
    fn publish(&self, result: &MatchCompleted);
}

/// Decides whether a credential may play a seat.
pub trait SeatAuthorizer: Send + Sync {
    /// Whether `credential` may play `side` in `match_id`.
    fn authorize(&self, match_id: MatchId, side: Side, credential: &str) -> bool;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATIONS
// =============================================================================

/// Session rows held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    records: RwLock<BTreeMap<MatchId, SessionRecord>>,
}

impl InMemorySessionRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub fn insert(&self, record: SessionRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.match_id, record);
    }

    /// Copy of a row.
    pub fn get(&self, match_id: MatchId) -> Option<SessionRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&match_id).cloned()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn load(&self, match_id: MatchId) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self.get(match_id))
    }

    fn save(&self, match_id: MatchId, snapshot: &Snapshot, metadata: &MatchMetadata) -> Result<(), RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records.get_mut(&match_id).ok_or(RepositoryError::NotFound(match_id))?;
        record.game_state = Some(snapshot.clone());
        record.metadata = metadata.to_blob();
        Ok(())
    }

    fn mark_completed(&self, result: &MatchCompleted) -> Result<(), RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(&result.match_id)
            .ok_or(RepositoryError::NotFound(result.match_id))?;
        record.result = Some(result.clone());
        Ok(())
    }
}

/// Keeps every published result.
#[derive(Debug, Default)]
pub struct InMemoryEventPublisher {
    published: Mutex<Vec<MatchCompleted>>,
}

impl InMemoryEventPublisher {
    /// Empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn published(&self) -> Vec<MatchCompleted> {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, result: &MatchCompleted) {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result.clone());
    }
}

/// Seat grants held in memory; `open()` admits any credential.
#[derive(Debug, Default)]
pub struct InMemorySeatAuthorizer {
    open: bool,
    grants: RwLock<BTreeMap<(MatchId, Side), String>>,
}

impl InMemorySeatAuthorizer {
    /// Authorizer that only admits granted credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorizer that admits everyone (local play and demos).
    pub fn open() -> Self {
        Self {
            open: true,
            grants: RwLock::default(),
        }
    }

    /// Allow `credential` to play `side`.
    pub fn grant(&self, match_id: MatchId, side: Side, credential: impl Into<String>) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        grants.insert((match_id, side), credential.into());
    }
}

impl SeatAuthorizer for InMemorySeatAuthorizer {
    fn authorize(&self, match_id: MatchId, side: Side, credential: &str) -> bool {
        if self.open {
            return true;
        }
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        grants.get(&(match_id, side)).is_some_and(|c| c == credential)
    }
}

// =============================================================================
// TESTS
// =============================================================================
