//! Network Layer
//!
//! Live match synchronization and the WebSocket gateway.
//! This layer is **non-deterministic** - every state change goes through
//! `game::Engine`, and replays never touch it.

pub mod protocol;
pub mod mapping;
pub mod session;
pub mod collaborators;
pub mod sync;
pub mod server;

pub use collaborators::{
    EventPublisher, InMemoryEventPublisher, InMemorySeatAuthorizer, InMemorySessionRepository,
    RepositoryError, SeatAuthorizer, SessionRecord, SessionRepository,
};
pub use mapping::{ClientMapping, DEFAULT_CLIENT_SCALE};
pub use protocol::{ClientMessage, ClientShot, MatchCompleted, MatchId, ServerMessage, StateUpdate, SyncEvent};
pub use server::{Gateway, GatewayError, ServerConfig};
pub use session::{EngineStore, InMemoryEngineStore, LiveMatch, MatchStatus, Seat};
pub use sync::{SyncConfig, SyncError, SyncService};
