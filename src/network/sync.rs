//! Session Synchronization
//!
//! Drives live matches: every shot, whoever plays it, goes through one
//! path under the match lock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SHOT PIPELINE                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. Lazy load     store ─miss─► repository snapshot / metadata  │
//! │  2. Validate      active, seat, turn (engine dry run)           │
//! │  3. Map           client space ──► engine space (3 dp)          │
//! │  4. Apply         Engine::apply_shot with frame capture         │
//! │  5. Log           shot log entry (rounded payload)              │
//! │  6. Persist       snapshot + metadata                           │
//! │  7. Broadcast     bump token, StateUpdate, frame stream         │
//! │  8. Follow-up     complete if over, else schedule the AI        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Frame streams and AI turns are spawned tasks. A stream stops as soon as
//! the match token moves past the token it was started with; an AI task
//! re-checks status, turn and shot number after taking the lock and does
//! nothing if the match has moved on.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::ai::search::{choose_placement, choose_shot};
use crate::core::rng::{derive_stream_seed, DeterministicRng};
use crate::game::engine::{Engine, EngineError};
use crate::game::input::{CaptureOptions, RawShot, ShotInput, ValidationError};
use crate::game::state::Side;
use crate::game::table::DEFAULT_SCALE;
use crate::network::collaborators::{EventPublisher, RepositoryError, SessionRepository};
use crate::network::mapping::{ClientMapping, DEFAULT_CLIENT_SCALE};
use crate::network::protocol::{
    ClientFrame, ClientGameState, ClientShot, FrameUpdate, MatchCompleted, MatchId, StateUpdate,
    SyncEvent, TurnTimeoutNotice,
};
use crate::network::session::{EngineStore, LiveMatch, MatchStatus, Seat, SharedMatch};
use crate::replay::metadata::{MatchMetadata, MetadataError};
use crate::replay::shot_log::{ShotLogEntry, ShotTrigger};
use crate::replay::verify::{resolve_completion, CompletionReason};

/// Sync layer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Display scale of the client
    pub client_scale: f64,
    /// Engine scale for matches created by this server
    pub default_scale: f64,
    /// Shortest AI thinking delay (ms)
    pub ai_think_min_ms: u64,
    /// Longest AI thinking delay (ms)
    pub ai_think_max_ms: u64,
    /// Idle time before a human turn is played out (0 disables)
    pub turn_timeout_seconds: u64,
    /// Period of the expiry sweep
    pub expiry_sweep_seconds: u64,
    /// Frame capture for live shots
    pub capture: CaptureOptions,
    /// Broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_scale: DEFAULT_CLIENT_SCALE,
            default_scale: DEFAULT_SCALE,
            ai_think_min_ms: 600,
            ai_think_max_ms: 1800,
            turn_timeout_seconds: 60,
            expiry_sweep_seconds: 5,
            capture: CaptureOptions::default(),
            event_capacity: 1024,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl SyncConfig {
    /// Load from `BREAKSHOT_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_scale: env_or("BREAKSHOT_CLIENT_SCALE", defaults.client_scale),
            default_scale: env_or("BREAKSHOT_DEFAULT_SCALE", defaults.default_scale),
            ai_think_min_ms: env_or("BREAKSHOT_AI_THINK_MIN_MS", defaults.ai_think_min_ms),
            ai_think_max_ms: env_or("BREAKSHOT_AI_THINK_MAX_MS", defaults.ai_think_max_ms),
            turn_timeout_seconds: env_or("BREAKSHOT_TURN_TIMEOUT_SECS", defaults.turn_timeout_seconds),
            expiry_sweep_seconds: env_or("BREAKSHOT_EXPIRY_SWEEP_SECS", defaults.expiry_sweep_seconds),
            ..defaults
        }
    }
}

/// Sync layer errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No live match and no session row
    #[error("match {0} not found")]
    UnknownMatch(MatchId),

    /// Match completed or faulted
    #[error("match {0} is not active")]
    NotActive(MatchId),

    /// The seat is played by the AI
    #[error("seat {0} is not played by a human")]
    WrongSeat(Side),

    /// Shot rejected; nothing changed
    #[error("shot rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// Internal consistency failure
    #[error("internal error: {0}")]
    Internal(String),

    /// Repository failure
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Bad metadata blob
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl From<EngineError> for SyncError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(e) => SyncError::Rejected(e),
            EngineError::Internal(message) => SyncError::Internal(message),
        }
    }
}

/// Coordinates live matches with storage, subscribers and the AI.
#[derive(Clone)]
pub struct SyncService {
    config: Arc<SyncConfig>,
    store: Arc<dyn EngineStore>,
    repository: Arc<dyn SessionRepository>,
    publisher: Arc<dyn EventPublisher>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncService {
    /// Create a service over the given collaborators.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn EngineStore>,
        repository: Arc<dyn SessionRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config: Arc::new(config),
            store,
            repository,
            publisher,
            events,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Receive every sync event.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Metadata for a new match at the configured default scale.
    pub fn new_metadata(
        &self,
        match_seed: u64,
        ai_difficulty: Option<u8>,
        max_duration_seconds: u64,
    ) -> Result<MatchMetadata, SyncError> {
        Ok(MatchMetadata::new(
            match_seed,
            self.config.default_scale,
            ai_difficulty,
            max_duration_seconds,
        )?)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn mapping(&self, metadata: &MatchMetadata) -> Result<ClientMapping, SyncError> {
        ClientMapping::new(self.config.client_scale, metadata.adjustment_scale)
            .map_err(|e| SyncError::Internal(e.to_string()))
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Live match, loaded from the repository on first contact.
    async fn live(&self, match_id: MatchId) -> Result<SharedMatch, SyncError> {
        if let Some(entry) = self.store.get(&match_id) {
            return Ok(entry);
        }

        let record = self
            .repository
            .load(match_id)?
            .ok_or(SyncError::UnknownMatch(match_id))?;
        let metadata = MatchMetadata::from_blob(&record.metadata)?;

        let engine = match &record.game_state {
            Some(snapshot) => {
                if snapshot.seed != metadata.match_seed {
                    error!(%match_id, "Stored snapshot seed does not match metadata");
                    return Err(SyncError::Internal("snapshot seed does not match metadata".into()));
                }
                Engine::from_snapshot(snapshot).map_err(|e| {
                    error!(%match_id, error = %e, "Stored snapshot rejected");
                    SyncError::from(e)
                })?
            }
            None => Engine::new(metadata.match_seed, metadata.adjustment_scale)
                .map_err(|e| SyncError::Internal(e.to_string()))?,
        };

        let mut live = LiveMatch::new(match_id, engine, metadata, record.started_at);
        if record.result.is_some() {
            live.status = MatchStatus::Completed;
        }
        debug!(%match_id, shots = live.metadata.shot_log.len(), "Live match loaded");

        let entry = self.store.insert(match_id, Arc::new(Mutex::new(live)));
        {
            // A restart may leave the AI on turn
            let mut live = entry.lock().await;
            self.schedule_ai(&mut live);
        }
        Ok(entry)
    }

    /// Current state of a match in client space.
    pub async fn state(&self, match_id: MatchId) -> Result<ClientGameState, SyncError> {
        let entry = self.live(match_id).await?;
        let live = entry.lock().await;
        Ok(self.mapping(&live.metadata)?.state(&live.engine))
    }

    // =========================================================================
    // SHOTS
    // =========================================================================

    /// Apply a human shot.
    #[instrument(skip_all, fields(match_id = %match_id, side = %side))]
    pub async fn submit_shot(
        &self,
        match_id: MatchId,
        side: Side,
        shot: ClientShot,
    ) -> Result<StateUpdate, SyncError> {
        let entry = self.live(match_id).await?;
        let mut live = entry.lock().await;

        if !live.is_active() {
            return Err(SyncError::NotActive(match_id));
        }
        if live.seat(side) != Seat::Human {
            return Err(SyncError::WrongSeat(side));
        }

        let raw = self.mapping(&live.metadata)?.to_engine_shot(&shot);
        self.apply_locked(&mut live, side, raw, ShotTrigger::Human, Utc::now())
    }

    /// The single mutation path. Caller holds the match lock.
    fn apply_locked(
        &self,
        live: &mut LiveMatch,
        side: Side,
        raw: RawShot,
        trigger: ShotTrigger,
        now: DateTime<Utc>,
    ) -> Result<StateUpdate, SyncError> {
        let mapping = self.mapping(&live.metadata)?;

        // Apply exactly what the log will hold
        let raw = raw.rounded();
        let input = ShotInput::from_raw(&raw, live.engine.table().max_power)?;

        let result = match live.engine.apply_shot(side, &input, Some(self.config.capture)) {
            Ok(result) => result,
            Err(EngineError::Validation(e)) => return Err(e.into()),
            Err(EngineError::Internal(message)) => {
                self.fault(live, &message);
                return Err(SyncError::Internal(message));
            }
        };

        let seq = live.metadata.next_seq();
        live.metadata
            .shot_log
            .push(ShotLogEntry::new(seq, now, side, &raw, trigger));
        live.last_activity = now;
        self.persist(live);

        let token = live.bump_token();
        let frames: Vec<ClientFrame> = result.frames.iter().map(|f| mapping.frame(f)).collect();
        let update = StateUpdate {
            match_id: live.id,
            token,
            state: mapping.state(&live.engine),
            shot: mapping.summary(side, &result),
            frames: if frames.is_empty() { None } else { Some(frames.clone()) },
        };
        self.emit(SyncEvent::StateUpdate(update.clone()));
        self.stream_frames(live.id, live.token_handle(), token, frames, result.duration_ms);

        info!(
            match_id = %live.id,
            shooter = %side,
            ?trigger,
            seq,
            shot = live.engine.rules().shot_number,
            pocketed = ?result.pocketed,
            fouls = ?result.fouls,
            "Shot accepted"
        );

        self.after_shot(live);
        Ok(update)
    }

    fn persist(&self, live: &LiveMatch) {
        let snapshot = live.engine.snapshot();
        if let Err(e) = self.repository.save(live.id, &snapshot, &live.metadata) {
            error!(match_id = %live.id, error = %e, "Failed to persist snapshot");
        }
    }

    fn after_shot(&self, live: &mut LiveMatch) {
        if live.engine.is_over() {
            self.complete_locked(live, CompletionReason::Normal);
        } else {
            self.schedule_ai(live);
        }
    }

    /// Resign a human seat.
    #[instrument(skip_all, fields(match_id = %match_id, side = %side))]
    pub async fn resign(&self, match_id: MatchId, side: Side) -> Result<MatchCompleted, SyncError> {
        let entry = self.live(match_id).await?;
        let mut live = entry.lock().await;

        if live.seat(side) != Seat::Human {
            return Err(SyncError::WrongSeat(side));
        }
        live.bump_token();
        self.complete_locked(&mut live, CompletionReason::Forfeit { side })
            .ok_or(SyncError::NotActive(match_id))
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    /// Complete an active match. Returns `None` if it was not active.
    fn complete_locked(&self, live: &mut LiveMatch, reason: CompletionReason) -> Option<MatchCompleted> {
        if !live.is_active() {
            return None;
        }
        live.status = MatchStatus::Completed;
        live.ai_pending = false;

        let rules = live.engine.rules();
        let result = MatchCompleted {
            match_id: live.id,
            resolution: resolve_completion(rules, reason),
            p1_score: rules.p1_score,
            p2_score: rules.p2_score,
            reason,
            shots: live.metadata.shot_log.len(),
            state_hash: crate::core::hash::to_hex(&live.engine.state_hash()),
        };

        if let Err(e) = self.repository.mark_completed(&result) {
            error!(match_id = %live.id, error = %e, "Failed to record result");
        }
        self.publisher.publish(&result);
        self.emit(SyncEvent::MatchCompleted(result.clone()));

        info!(
            match_id = %live.id,
            resolution = ?result.resolution,
            ?reason,
            p1 = result.p1_score,
            p2 = result.p2_score,
            "Match completed"
        );
        Some(result)
    }

    fn fault(&self, live: &mut LiveMatch, message: &str) {
        live.status = MatchStatus::Faulted;
        live.ai_pending = false;
        live.bump_token();
        error!(match_id = %live.id, message, "Match faulted");
    }

    // =========================================================================
    // FRAME STREAMING
    // =========================================================================

    /// Emit frames one interval apart while `current` still equals `token`.
    fn stream_frames(
        &self,
        match_id: MatchId,
        current: Arc<AtomicU64>,
        token: u64,
        frames: Vec<ClientFrame>,
        duration_ms: u64,
    ) {
        if frames.is_empty() {
            return;
        }
        let total = frames.len();
        let interval = Duration::from_millis((duration_ms / total as u64).max(1));
        let events = self.events.clone();

        tokio::spawn(async move {
            for (index, frame) in frames.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(interval).await;
                }
                if current.load(Ordering::SeqCst) != token {
                    debug!(%match_id, token, index, "Frame stream superseded");
                    return;
                }
                let _ = events.send(SyncEvent::Frame(FrameUpdate {
                    match_id,
                    token,
                    index,
                    total,
                    balls: frame.balls,
                }));
            }
        });
    }

    // =========================================================================
    // AI TURNS
    // =========================================================================

    fn think_delay(&self, live: &LiveMatch) -> Duration {
        let min = self.config.ai_think_min_ms;
        let max = self.config.ai_think_max_ms.max(min);
        let seed = derive_stream_seed(
            live.metadata.match_seed,
            b"think",
            live.engine.rules().shot_number,
            live.engine.turn().tag(),
        );
        Duration::from_millis(DeterministicRng::new(seed).next_int_range(min, max))
    }

    /// Spawn the AI's turn if the AI is on turn and nothing is pending.
    fn schedule_ai(&self, live: &mut LiveMatch) {
        if live.ai_pending || live.ai_on_turn().is_none() {
            return;
        }
        live.ai_pending = true;

        let match_id = live.id;
        let shot_number = live.engine.rules().shot_number;
        let delay = self.think_delay(live);
        debug!(%match_id, shot_number, delay_ms = delay.as_millis() as u64, "AI turn scheduled");

        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.run_ai_turn(match_id, shot_number).await;
        });
    }

    #[instrument(skip(self))]
    async fn run_ai_turn(&self, match_id: MatchId, shot_number: u32) {
        let Some(entry) = self.store.get(&match_id) else { return };

        let (snapshot, side, difficulty) = {
            let mut live = entry.lock().await;
            match live.ai_on_turn() {
                Some(difficulty) if live.engine.rules().shot_number == shot_number => {
                    (live.engine.snapshot(), live.engine.turn(), difficulty)
                }
                _ => {
                    live.ai_pending = false;
                    debug!("Stale AI turn skipped");
                    return;
                }
            }
        };

        // CPU-bound search on a disposable copy, off the async workers
        let search = tokio::task::spawn_blocking(move || choose_shot(&snapshot, side, difficulty)).await;

        let mut live = entry.lock().await;
        live.ai_pending = false;
        if live.ai_on_turn().is_none()
            || live.engine.turn() != side
            || live.engine.rules().shot_number != shot_number
        {
            debug!("AI shot discarded, match moved on");
            return;
        }

        let input = match search {
            Ok(Ok(input)) => input,
            Ok(Err(e)) => {
                self.fault(&mut live, &format!("AI search failed: {}", e));
                return;
            }
            Err(e) => {
                self.fault(&mut live, &format!("AI task failed: {}", e));
                return;
            }
        };

        match self.apply_locked(&mut live, side, input.to_raw(), ShotTrigger::Ai, Utc::now()) {
            Ok(_) | Err(SyncError::Internal(_)) => {}
            Err(e) => self.fault(&mut live, &format!("AI shot rejected: {}", e)),
        }
    }

    // =========================================================================
    // EXPIRY
    // =========================================================================

    /// Complete matches past their duration budget and play out idle human
    /// turns. Returns the matches completed by this sweep.
    #[instrument(skip_all)]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<MatchCompleted> {
        let mut completed = Vec::new();

        for match_id in self.store.ids() {
            let Some(entry) = self.store.get(&match_id) else { continue };
            let mut live = entry.lock().await;

            match live.status {
                MatchStatus::Completed => {
                    drop(live);
                    self.store.remove(&match_id);
                    continue;
                }
                MatchStatus::Faulted => continue,
                MatchStatus::Active => {}
            }

            let budget_ms = i64::try_from(live.metadata.max_duration_seconds.saturating_mul(1000))
                .unwrap_or(i64::MAX);
            if now.signed_duration_since(live.started_at).num_milliseconds() > budget_ms {
                live.bump_token();
                if let Some(result) = self.complete_locked(&mut live, CompletionReason::Timeout) {
                    completed.push(result);
                }
                continue;
            }

            self.check_turn_timeout(&mut live, now);
        }

        completed
    }

    fn check_turn_timeout(&self, live: &mut LiveMatch, now: DateTime<Utc>) {
        let limit = self.config.turn_timeout_seconds;
        if limit == 0 || live.engine.is_over() {
            return;
        }
        let side = live.engine.turn();
        if live.seat(side) != Seat::Human {
            return;
        }
        let budget_ms = i64::try_from(limit.saturating_mul(1000)).unwrap_or(i64::MAX);
        if now.signed_duration_since(live.last_activity).num_milliseconds() <= budget_ms {
            return;
        }

        let Some(input) = timeout_shot(&live.engine) else {
            self.fault(live, "no legal cue placement for timeout shot");
            return;
        };
        let shot_number = live.engine.rules().shot_number;
        match self.apply_locked(live, side, input.to_raw(), ShotTrigger::TurnTimeout, now) {
            Ok(_) => {
                warn!(match_id = %live.id, %side, shot_number, "Turn timed out");
                self.emit(SyncEvent::TurnTimeout(TurnTimeoutNotice {
                    match_id: live.id,
                    side,
                    shot_number,
                }));
            }
            Err(SyncError::Internal(_)) => {}
            Err(e) => self.fault(live, &format!("timeout shot rejected: {}", e)),
        }
    }

    /// Run `sweep_expired` every `expiry_sweep_seconds`.
    pub fn spawn_expiry_loop(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = Duration::from_secs(self.config.expiry_sweep_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let completed = service.sweep_expired(Utc::now()).await;
                if !completed.is_empty() {
                    info!(count = completed.len(), "Expired matches completed");
                }
            }
        })
    }
}

/// Zero-power shot played for an idle seat; a no-contact foul.
fn timeout_shot(engine: &Engine) -> Option<ShotInput> {
    let mut input = ShotInput::forfeit_turn();
    if engine.rules().ball_in_hand {
        input.cue_ball_position = Some(choose_placement(engine, &[])?);
    }
    Some(input)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::Foul;
    use crate::network::collaborators::{InMemoryEventPublisher, InMemorySessionRepository, SessionRecord};
    use crate::network::session::InMemoryEngineStore;
    use crate::replay::verify::{replay, Resolution};
    use chrono::TimeZone;
    use uuid::Uuid;

    struct Harness {
        service: SyncService,
        repository: Arc<InMemorySessionRepository>,
        publisher: Arc<InMemoryEventPublisher>,
    }

    fn harness(config: SyncConfig) -> Harness {
        let repository = Arc::new(InMemorySessionRepository::new());
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let service = SyncService::new(
            config,
            Arc::new(InMemoryEngineStore::new()),
            repository.clone(),
            publisher.clone(),
        );
        Harness {
            service,
            repository,
            publisher,
        }
    }

    fn quick_config() -> SyncConfig {
        SyncConfig {
            ai_think_min_ms: 0,
            ai_think_max_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn seed_match(h: &Harness, seed: u64, ai: Option<u8>, max_duration: u64, started_at: DateTime<Utc>) -> MatchId {
        let id = Uuid::new_v4();
        let metadata = h.service.new_metadata(seed, ai, max_duration).unwrap();
        h.repository.insert(SessionRecord::new(id, &metadata, started_at));
        id
    }

    fn break_shot() -> ClientShot {
        ClientShot {
            direction: [1.0, 0.0],
            power: 5000.0,
            cue_ball_position: None,
            screw: 0.0,
            english: 0.0,
        }
    }

    fn stored_metadata(h: &Harness, id: MatchId) -> MatchMetadata {
        MatchMetadata::from_blob(&h.repository.get(id).unwrap().metadata).unwrap()
    }

    async fn next_event<F>(rx: &mut broadcast::Receiver<SyncEvent>, mut pred: F) -> SyncEvent
    where
        F: FnMut(&SyncEvent) -> bool,
    {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_submit_shot_persists_and_replays() {
        let h = harness(quick_config());
        let id = seed_match(&h, 42, None, 600, Utc::now());
        let mut rx = h.service.subscribe();

        let update = h.service.submit_shot(id, Side::P1, break_shot()).await.unwrap();
        assert_eq!(update.token, 1);
        assert_eq!(update.state.rules.shot_number, 1);
        assert_eq!(update.shot.shooter, Side::P1);
        assert!(update.shot.first_contact.is_some());
        assert!(update.frames.as_ref().is_some_and(|f| !f.is_empty()));

        let event = next_event(&mut rx, |e| matches!(e, SyncEvent::StateUpdate(_))).await;
        assert_eq!(event, SyncEvent::StateUpdate(update.clone()));

        let record = h.repository.get(id).unwrap();
        let snapshot = record.game_state.unwrap();
        assert_eq!(snapshot.state_hash_hex(), update.state.state_hash);

        let metadata = stored_metadata(&h, id);
        assert_eq!(metadata.shot_log.len(), 1);
        assert_eq!(metadata.shot_log[0].seq, 1);
        assert_eq!(metadata.shot_log[0].trigger, ShotTrigger::Human);

        let replayed = replay(&metadata.shot_log, metadata.match_seed, metadata.adjustment_scale).unwrap();
        assert_eq!(replayed.final_hash(), update.state.state_hash);
    }

    #[tokio::test]
    async fn test_wrong_turn_rejected_without_mutation() {
        let h = harness(quick_config());
        let id = seed_match(&h, 42, None, 600, Utc::now());
        let before = h.service.state(id).await.unwrap();

        let err = h.service.submit_shot(id, Side::P2, break_shot()).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Rejected(ValidationError::WrongTurn {
                expected: Side::P1,
                actual: Side::P2
            })
        ));

        let mut bad = break_shot();
        bad.power = 1e9;
        let err = h.service.submit_shot(id, Side::P1, bad).await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected(ValidationError::PowerOutOfRange { .. })));

        assert_eq!(h.service.state(id).await.unwrap(), before);
        assert!(h.repository.get(id).unwrap().game_state.is_none());
    }

    #[tokio::test]
    async fn test_unknown_match_and_ai_seat() {
        let h = harness(quick_config());
        let err = h
            .service
            .submit_shot(Uuid::new_v4(), Side::P1, break_shot())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownMatch(_)));

        let id = seed_match(&h, 9, Some(50), 600, Utc::now());
        let err = h.service.submit_shot(id, Side::P2, break_shot()).await.unwrap_err();
        assert!(matches!(err, SyncError::WrongSeat(Side::P2)));
    }

    #[tokio::test]
    async fn test_frame_stream_runs_to_end() {
        let h = harness(quick_config());
        let mut rx = h.service.subscribe();
        let id = Uuid::new_v4();
        let frames: Vec<ClientFrame> = (0..3)
            .map(|step| ClientFrame { step, balls: Vec::new() })
            .collect();

        h.service
            .stream_frames(id, Arc::new(AtomicU64::new(7)), 7, frames, 3);

        for expected in 0..3 {
            match next_event(&mut rx, |e| matches!(e, SyncEvent::Frame(_))).await {
                SyncEvent::Frame(frame) => {
                    assert_eq!(frame.index, expected);
                    assert_eq!(frame.total, 3);
                    assert_eq!(frame.token, 7);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_frame_stream_stops_on_new_token() {
        let h = harness(quick_config());
        let mut rx = h.service.subscribe();
        let token = Arc::new(AtomicU64::new(1));
        let frames: Vec<ClientFrame> = (0..50)
            .map(|step| ClientFrame { step, balls: Vec::new() })
            .collect();

        // 20 ms apart
        h.service
            .stream_frames(Uuid::nil(), token.clone(), 1, frames, 1000);
        let first = next_event(&mut rx, |e| matches!(e, SyncEvent::Frame(_))).await;
        assert!(matches!(first, SyncEvent::Frame(FrameUpdate { index: 0, .. })));

        token.store(2, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut received = 1;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SyncEvent::Frame(_)) {
                received += 1;
            }
        }
        assert!(received < 50);
    }

    #[tokio::test]
    async fn test_expiry_fires_once_with_draw() {
        let h = harness(SyncConfig {
            turn_timeout_seconds: 0,
            ..quick_config()
        });
        let id = seed_match(&h, 11, None, 300, t0());
        h.service.state(id).await.unwrap();

        assert!(h.service.sweep_expired(t0() + chrono::Duration::seconds(299)).await.is_empty());

        let completed = h.service.sweep_expired(t0() + chrono::Duration::seconds(301)).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].reason, CompletionReason::Timeout);
        assert_eq!(completed[0].resolution, Resolution::Draw);

        assert!(h.service.sweep_expired(t0() + chrono::Duration::seconds(302)).await.is_empty());
        assert!(h.service.sweep_expired(t0() + chrono::Duration::seconds(900)).await.is_empty());

        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.repository.get(id).unwrap().result, Some(completed[0].clone()));

        // Reloaded from the repository as completed
        let err = h.service.submit_shot(id, Side::P1, break_shot()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotActive(_)));
    }

    #[tokio::test]
    async fn test_turn_timeout_plays_logged_foul() {
        let h = harness(quick_config());
        let id = seed_match(&h, 21, None, 3600, t0());
        let mut rx = h.service.subscribe();
        h.service.state(id).await.unwrap();

        // Not idle long enough
        h.service.sweep_expired(t0() + chrono::Duration::seconds(59)).await;
        assert!(h.repository.get(id).unwrap().game_state.is_none());

        h.service.sweep_expired(t0() + chrono::Duration::seconds(61)).await;
        let update = match next_event(&mut rx, |e| matches!(e, SyncEvent::StateUpdate(_))).await {
            SyncEvent::StateUpdate(update) => update,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(update.shot.fouls, vec![Foul::NoContact]);
        assert_eq!(update.state.rules.turn, Side::P2);
        assert!(update.state.rules.ball_in_hand);

        let notice = next_event(&mut rx, |e| matches!(e, SyncEvent::TurnTimeout(_))).await;
        assert_eq!(
            notice,
            SyncEvent::TurnTimeout(TurnTimeoutNotice {
                match_id: id,
                side: Side::P1,
                shot_number: 0,
            })
        );

        // p2 idles with ball in hand
        h.service.sweep_expired(t0() + chrono::Duration::seconds(122)).await;
        let metadata = stored_metadata(&h, id);
        assert_eq!(metadata.shot_log.len(), 2);
        assert!(metadata
            .shot_log
            .iter()
            .all(|e| e.trigger == ShotTrigger::TurnTimeout));
        assert!(metadata.shot_log[1].shot.cue_ball_position.is_some());

        let replayed = replay(&metadata.shot_log, metadata.match_seed, metadata.adjustment_scale).unwrap();
        let snapshot = h.repository.get(id).unwrap().game_state.unwrap();
        assert_eq!(replayed.final_hash(), snapshot.state_hash_hex());
        assert_eq!(replayed.rules().turn, Side::P1);
    }

    #[tokio::test]
    async fn test_resign_forfeits_once() {
        let h = harness(quick_config());
        let id = seed_match(&h, 5, None, 600, Utc::now());

        let result = h.service.resign(id, Side::P1).await.unwrap();
        assert_eq!(result.resolution, Resolution::Winner { side: Side::P2 });
        assert_eq!(result.reason, CompletionReason::Forfeit { side: Side::P1 });
        assert_eq!(result.winner(), Some(Side::P2));

        assert!(matches!(
            h.service.resign(id, Side::P2).await,
            Err(SyncError::NotActive(_))
        ));
        assert_eq!(h.publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_ai_plays_its_turn() {
        let h = harness(quick_config());
        let id = seed_match(&h, 33, Some(10), 3600, Utc::now());
        let mut rx = h.service.subscribe();

        // A dead shot hands the AI ball in hand
        let mut dead = break_shot();
        dead.power = 0.0;
        let update = h.service.submit_shot(id, Side::P1, dead).await.unwrap();
        assert_eq!(update.state.rules.turn, Side::P2);

        let ai_update = next_event(&mut rx, |e| {
            matches!(e, SyncEvent::StateUpdate(u) if u.shot.shooter == Side::P2)
        })
        .await;
        assert!(matches!(ai_update, SyncEvent::StateUpdate(_)));

        let record = h.repository.get(id).unwrap();
        let metadata = MatchMetadata::from_blob(&record.metadata).unwrap();
        assert_eq!(metadata.shot_log[1].trigger, ShotTrigger::Ai);
        assert_eq!(metadata.shot_log[1].actor_side, Side::P2);

        let replayed = replay(&metadata.shot_log, metadata.match_seed, metadata.adjustment_scale).unwrap();
        assert_eq!(replayed.final_hash(), record.game_state.unwrap().state_hash_hex());
    }

    #[tokio::test]
    async fn test_stale_ai_task_is_noop() {
        let h = harness(quick_config());
        let id = seed_match(&h, 33, Some(10), 3600, Utc::now());
        h.service.state(id).await.unwrap();

        // p1 is on turn and the shot number is wrong
        h.service.run_ai_turn(id, 99).await;

        let entry = h.service.store.get(&id).unwrap();
        let live = entry.lock().await;
        assert!(live.metadata.shot_log.is_empty());
        assert!(!live.ai_pending);
        assert!(live.is_active());
    }

    #[tokio::test]
    async fn test_lazy_load_resumes_from_snapshot() {
        let h = harness(quick_config());
        let id = seed_match(&h, 42, None, 600, Utc::now());
        let update = h.service.submit_shot(id, Side::P1, break_shot()).await.unwrap();

        // Fresh process over the same repository
        let restarted = SyncService::new(
            quick_config(),
            Arc::new(InMemoryEngineStore::new()),
            h.repository.clone(),
            h.publisher.clone(),
        );
        let state = restarted.state(id).await.unwrap();
        assert_eq!(state, update.state);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_internal() {
        let h = harness(quick_config());
        let id = seed_match(&h, 42, None, 600, Utc::now());
        let mut snapshot = Engine::new(42, DEFAULT_SCALE).unwrap().snapshot();
        snapshot.version = 99;
        let mut record = h.repository.get(id).unwrap();
        record.game_state = Some(snapshot);
        h.repository.insert(record);

        let err = h.service.submit_shot(id, Side::P1, break_shot()).await.unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.client_scale, DEFAULT_CLIENT_SCALE);
        assert_eq!(config.default_scale, DEFAULT_SCALE);
        assert!(config.ai_think_min_ms <= config.ai_think_max_ms);
        assert!(config.capture.validate().is_ok());
    }
}
