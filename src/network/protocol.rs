//! Protocol Messages
//!
//! Wire format for the WebSocket gateway and the synchronization event
//! stream. Everything here is in client space: positions are already
//! mapped to the client's display scale and rounded to 3 decimals.
//!
//! ```text
//!   client ── {"type":"subscribe"} ──► gateway
//!   client ── {"type":"shot", ...} ──► gateway ──► SyncService
//!   client ◄── SyncEvent (JSON) ────── gateway ◄── broadcast
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::rules::Foul;
use crate::game::state::{RulesState, Side};
use crate::replay::verify::{CompletionReason, Resolution};

/// Match identifier.
pub type MatchId = Uuid;

// =============================================================================
// CLIENT-SPACE PAYLOADS
// =============================================================================

/// A shot as the client sends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientShot {
    /// Unit cue direction
    pub direction: [f64; 2],
    /// Power in `[0, maxPower]`
    pub power: f64,
    /// Cue ball placement in client space, with ball in hand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_ball_position: Option<[f64; 2]>,
    /// Top/back spin in `[-1, 1]`
    #[serde(default)]
    pub screw: f64,
    /// Side spin in `[-1, 1]`
    #[serde(default)]
    pub english: f64,
}

/// One ball in client space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientBall {
    /// Ball id (0 is the cue ball)
    pub id: u8,
    /// Center position
    pub position: [f64; 2],
    /// Still on the table
    pub active: bool,
}

/// Full table and rules state in client space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientGameState {
    /// All sixteen balls
    pub balls: Vec<ClientBall>,
    /// Turn, groups, scores and status
    pub rules: RulesState,
    /// Authoritative state hash (hex)
    pub state_hash: String,
}

/// What a shot did, in client terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientShotSummary {
    /// Side that shot
    pub shooter: Side,
    /// Balls pocketed, in order
    pub pocketed: Vec<u8>,
    /// Fouls committed
    pub fouls: Vec<Foul>,
    /// First object ball the cue ball touched
    pub first_contact: Option<u8>,
    /// Cue ball went down
    pub cue_scratch: bool,
    /// Simulated duration
    pub duration_ms: u64,
}

/// One animation frame in client space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Simulation step the frame was captured at
    pub step: u32,
    /// All sixteen balls
    pub balls: Vec<ClientBall>,
}

// =============================================================================
// SYNC EVENTS
// =============================================================================

/// Events broadcast to subscribers of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A shot was applied.
    StateUpdate(StateUpdate),
    /// One frame of the latest shot's animation.
    Frame(FrameUpdate),
    /// The match is over.
    MatchCompleted(MatchCompleted),
    /// A human turn ran out of time.
    TurnTimeout(TurnTimeoutNotice),
}

impl SyncEvent {
    /// Match the event belongs to.
    pub fn match_id(&self) -> MatchId {
        match self {
            SyncEvent::StateUpdate(e) => e.match_id,
            SyncEvent::Frame(e) => e.match_id,
            SyncEvent::MatchCompleted(e) => e.match_id,
            SyncEvent::TurnTimeout(e) => e.match_id,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Post-shot state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Match
    pub match_id: MatchId,
    /// Broadcast token of this shot
    pub token: u64,
    /// State after the shot
    pub state: ClientGameState,
    /// What happened
    pub shot: ClientShotSummary,
    /// Whole animation, when frames were captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<ClientFrame>>,
}

/// Streamed animation frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUpdate {
    /// Match
    pub match_id: MatchId,
    /// Token of the shot being animated
    pub token: u64,
    /// Position in the frame sequence
    pub index: usize,
    /// Frame count of the sequence
    pub total: usize,
    /// Ball positions
    pub balls: Vec<ClientBall>,
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCompleted {
    /// Match
    pub match_id: MatchId,
    /// Winner, draw or unresolved
    pub resolution: Resolution,
    /// Player one's score
    pub p1_score: u32,
    /// Player two's score
    pub p2_score: u32,
    /// Why the match ended
    pub reason: CompletionReason,
    /// Shots in the log
    pub shots: usize,
    /// Final state hash (hex)
    pub state_hash: String,
}

impl MatchCompleted {
    /// Winning side, if any.
    pub fn winner(&self) -> Option<Side> {
        match self.resolution {
            Resolution::Winner { side } => Some(side),
            Resolution::Draw | Resolution::Unresolved => None,
        }
    }
}

/// A human turn timed out and a no-contact shot was played for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTimeoutNotice {
    /// Match
    pub match_id: MatchId,
    /// Side that ran out of time
    pub side: Side,
    /// Shot number the timeout shot was played at
    pub shot_number: u32,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Follow a match, optionally claiming a seat.
    Subscribe {
        /// Match to follow
        match_id: MatchId,
        /// Seat to play, absent for spectators
        #[serde(default)]
        side: Option<Side>,
        /// Seat credential checked by the authorizer
        #[serde(default)]
        credential: Option<String>,
    },

    /// Play a shot from the claimed seat.
    Shot {
        /// The shot
        #[serde(flatten)]
        shot: ClientShot,
    },

    /// Resign from the claimed seat.
    Resign,

    /// Latency probe.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Direct replies from gateway to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription accepted.
    Subscribed {
        /// Match
        match_id: MatchId,
        /// Claimed seat
        side: Option<Side>,
        /// Current state
        state: ClientGameState,
    },

    /// Shot applied; the state follows as a `state_update` event.
    ShotAccepted {
        /// Shot number after the shot
        shot_number: u32,
    },

    /// Request failed.
    Error(ServerError),

    /// Latency reply.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server time (unix ms)
        server_time: u64,
    },
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unparseable message
    InvalidInput,
    /// Seat credential refused
    Unauthorized,
    /// Action needs a subscription or a seat
    NotSubscribed,
    /// No such match
    MatchNotFound,
    /// Match already completed or faulted
    MatchNotActive,
    /// Not this seat's turn
    WrongTurn,
    /// Shot payload or placement rejected
    ShotRejected,
    /// Server-side failure
    Internal,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_shot_message_parses_flat_payload() {
        let json = r#"{"type":"shot","direction":[1.0,0.0],"power":2500.5,"screw":0.25}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        match msg {
            ClientMessage::Shot { shot } => {
                assert_eq!(shot.direction, [1.0, 0.0]);
                assert_eq!(shot.power, 2500.5);
                assert_eq!(shot.screw, 0.25);
                assert_eq!(shot.english, 0.0);
                assert!(shot.cue_ball_position.is_none());
            }
            other => panic!("expected shot, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_defaults_to_spectator() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"type":"subscribe","match_id":"{}"}}"#, id);
        let msg = ClientMessage::from_json(&json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                match_id: id,
                side: None,
                credential: None,
            }
        );

        let json = format!(r#"{{"type":"subscribe","match_id":"{}","side":"p2","credential":"k"}}"#, id);
        match ClientMessage::from_json(&json).unwrap() {
            ClientMessage::Subscribe { side, credential, .. } => {
                assert_eq!(side, Some(Side::P2));
                assert_eq!(credential.as_deref(), Some("k"));
            }
            other => panic!("expected subscribe, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_sync_event_is_tagged() {
        let event = SyncEvent::TurnTimeout(TurnTimeoutNotice {
            match_id: Uuid::nil(),
            side: Side::P1,
            shot_number: 4,
        });
        let json = event.to_json().unwrap();
        assert!(json.contains(r#""type":"turn_timeout""#));
        assert!(json.contains(r#""shotNumber":4"#));
        assert!(json.contains(r#""side":"p1""#));
        assert_eq!(event.match_id(), Uuid::nil());
    }

    #[test]
    fn test_match_completed_winner() {
        let mut completed = MatchCompleted {
            match_id: Uuid::nil(),
            resolution: Resolution::Winner { side: Side::P2 },
            p1_score: 3,
            p2_score: 7,
            reason: CompletionReason::Normal,
            shots: 21,
            state_hash: String::new(),
        };
        assert_eq!(completed.winner(), Some(Side::P2));

        completed.resolution = Resolution::Draw;
        assert_eq!(completed.winner(), None);

        let json = serde_json::to_string(&SyncEvent::MatchCompleted(completed)).unwrap();
        assert!(json.contains(r#""type":"match_completed""#));
        assert!(json.contains(r#""resolution":{"type":"draw"}"#));
    }

    #[test]
    fn test_error_code_serialization() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::WrongTurn,
            message: "p2 to shoot".to_string(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("wrong_turn"));
    }
}
