//! WebSocket Gateway
//!
//! Async WebSocket front door for players and spectators. Each connection
//! follows at most one match; seat claims are checked by the
//! [`SeatAuthorizer`], shots and resignations go to the [`SyncService`],
//! and every [`SyncEvent`](crate::network::protocol::SyncEvent) for the
//! followed match is forwarded as JSON.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::input::ValidationError;
use crate::game::state::Side;
use crate::network::collaborators::SeatAuthorizer;
use crate::network::protocol::{ClientMessage, ErrorCode, MatchId, ServerError, ServerMessage};
use crate::network::sync::{SyncError, SyncService};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Load from `BREAKSHOT_BIND_ADDR` and `BREAKSHOT_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BREAKSHOT_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("BREAKSHOT_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// What one connection is following.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscription {
    /// Followed match
    pub match_id: Option<MatchId>,
    /// Claimed seat, if a player
    pub side: Option<Side>,
}

fn error_reply(code: ErrorCode, message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code,
        message: message.into(),
    })
}

/// Client-facing error for a sync failure.
pub fn sync_error_reply(err: &SyncError) -> ServerMessage {
    let code = match err {
        SyncError::UnknownMatch(_) => ErrorCode::MatchNotFound,
        SyncError::NotActive(_) | SyncError::Rejected(ValidationError::MatchOver) => ErrorCode::MatchNotActive,
        SyncError::WrongSeat(_) => ErrorCode::Unauthorized,
        SyncError::Rejected(ValidationError::WrongTurn { .. }) => ErrorCode::WrongTurn,
        SyncError::Rejected(_) => ErrorCode::ShotRejected,
        SyncError::Internal(_) | SyncError::Repository(_) | SyncError::Metadata(_) => ErrorCode::Internal,
    };
    let message = match err {
        // Internal details stay in the logs
        SyncError::Internal(_) | SyncError::Repository(_) => "internal server error".to_string(),
        other => other.to_string(),
    };
    error_reply(code, message)
}

fn server_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// The gateway.
pub struct Gateway {
    config: ServerConfig,
    sync: SyncService,
    authorizer: Arc<dyn SeatAuthorizer>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Gateway {
    /// Create a gateway in front of a sync service.
    pub fn new(config: ServerConfig, sync: SyncService, authorizer: Arc<dyn SeatAuthorizer>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            sync,
            authorizer,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        info!("Gateway listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count() >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let sync = self.sync.clone();
        let authorizer = Arc::clone(&self.authorizer);
        let connections = Arc::clone(&self.connections);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

            let sender_task = tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut events = sync.subscribe();
            let mut subscription = Subscription::default();

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let reply = match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(client_msg) => {
                                    handle_client_message(&sync, authorizer.as_ref(), &mut subscription, client_msg).await
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    Some(error_reply(ErrorCode::InvalidInput, "Invalid message format"))
                                }
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Some(Ok(_)) => None,
                        };
                        if let Some(reply) = reply {
                            if !send_json(&out_tx, &reply).await {
                                break;
                            }
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) if subscription.match_id == Some(event.match_id()) => {
                                match event.to_json() {
                                    Ok(text) => {
                                        if out_tx.send(text).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => error!("Failed to serialize event: {}", e),
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Client {} lagged, {} events dropped", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            drop(out_tx);
            let _ = sender_task.await;
            connections.fetch_sub(1, Ordering::SeqCst);
            debug!("Client {} cleaned up", addr);
        });
    }
}

async fn send_json(out: &mpsc::Sender<String>, msg: &ServerMessage) -> bool {
    match msg.to_json() {
        Ok(text) => out.send(text).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Handle one client message; returns the direct reply, if any.
pub async fn handle_client_message(
    sync: &SyncService,
    authorizer: &dyn SeatAuthorizer,
    subscription: &mut Subscription,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Subscribe {
            match_id,
            side,
            credential,
        } => {
            if let Some(side) = side {
                let credential = credential.unwrap_or_default();
                if !authorizer.authorize(match_id, side, &credential) {
                    return Some(error_reply(
                        ErrorCode::Unauthorized,
                        format!("not allowed to play {} in {}", side, match_id),
                    ));
                }
            }
            match sync.state(match_id).await {
                Ok(state) => {
                    *subscription = Subscription {
                        match_id: Some(match_id),
                        side,
                    };
                    Some(ServerMessage::Subscribed { match_id, side, state })
                }
                Err(e) => Some(sync_error_reply(&e)),
            }
        }
        ClientMessage::Shot { shot } => {
            let (Some(match_id), Some(side)) = (subscription.match_id, subscription.side) else {
                return Some(error_reply(ErrorCode::NotSubscribed, "claim a seat before shooting"));
            };
            match sync.submit_shot(match_id, side, shot).await {
                Ok(update) => Some(ServerMessage::ShotAccepted {
                    shot_number: update.state.rules.shot_number,
                }),
                Err(e) => Some(sync_error_reply(&e)),
            }
        }
        ClientMessage::Resign => {
            let (Some(match_id), Some(side)) = (subscription.match_id, subscription.side) else {
                return Some(error_reply(ErrorCode::NotSubscribed, "claim a seat before resigning"));
            };
            // The result arrives as a match_completed event
            match sync.resign(match_id, side).await {
                Ok(_) => None,
                Err(e) => Some(sync_error_reply(&e)),
            }
        }
        ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong {
            timestamp,
            server_time: server_time_ms(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::collaborators::{
        InMemoryEventPublisher, InMemorySeatAuthorizer, InMemorySessionRepository, SessionRecord,
    };
    use crate::network::protocol::ClientShot;
    use crate::network::session::InMemoryEngineStore;
    use crate::network::sync::SyncConfig;
    use std::time::Duration;
    use uuid::Uuid;

    fn sync_with_match() -> (SyncService, MatchId) {
        let repository = Arc::new(InMemorySessionRepository::new());
        let sync = SyncService::new(
            SyncConfig::default(),
            Arc::new(InMemoryEngineStore::new()),
            repository.clone(),
            Arc::new(InMemoryEventPublisher::new()),
        );
        let id = Uuid::new_v4();
        let metadata = sync.new_metadata(42, None, 600).unwrap();
        repository.insert(SessionRecord::new(id, &metadata, chrono::Utc::now()));
        (sync, id)
    }

    fn shot() -> ClientShot {
        ClientShot {
            direction: [1.0, 0.0],
            power: 5000.0,
            cue_ball_position: None,
            screw: 0.0,
            english: 0.0,
        }
    }

    fn error_code(reply: Option<ServerMessage>) -> ErrorCode {
        match reply {
            Some(ServerMessage::Error(e)) => e.code,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_sync_error_codes() {
        let id = Uuid::nil();
        let code = |e: SyncError| match sync_error_reply(&e) {
            ServerMessage::Error(e) => e.code,
            _ => unreachable!(),
        };
        assert_eq!(code(SyncError::UnknownMatch(id)), ErrorCode::MatchNotFound);
        assert_eq!(code(SyncError::NotActive(id)), ErrorCode::MatchNotActive);
        assert_eq!(code(SyncError::Rejected(ValidationError::MatchOver)), ErrorCode::MatchNotActive);
        assert_eq!(
            code(SyncError::Rejected(ValidationError::WrongTurn {
                expected: Side::P1,
                actual: Side::P2,
            })),
            ErrorCode::WrongTurn
        );
        assert_eq!(code(SyncError::Rejected(ValidationError::PlacementRequired)), ErrorCode::ShotRejected);
        assert_eq!(code(SyncError::WrongSeat(Side::P2)), ErrorCode::Unauthorized);

        match sync_error_reply(&SyncError::Internal("ball 17".into())) {
            ServerMessage::Error(e) => {
                assert_eq!(e.code, ErrorCode::Internal);
                assert!(!e.message.contains("17"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_seat_claims_are_authorized() {
        let (sync, id) = sync_with_match();
        let auth = InMemorySeatAuthorizer::new();
        auth.grant(id, Side::P1, "p1-key");
        let mut sub = Subscription::default();

        let reply = handle_client_message(
            &sync,
            &auth,
            &mut sub,
            ClientMessage::Subscribe {
                match_id: id,
                side: Some(Side::P1),
                credential: Some("wrong".into()),
            },
        )
        .await;
        assert_eq!(error_code(reply), ErrorCode::Unauthorized);
        assert_eq!(sub, Subscription::default());

        let reply = handle_client_message(
            &sync,
            &auth,
            &mut sub,
            ClientMessage::Subscribe {
                match_id: id,
                side: Some(Side::P1),
                credential: Some("p1-key".into()),
            },
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::Subscribed { side: Some(Side::P1), .. })));
        assert_eq!(sub.side, Some(Side::P1));

        let reply = handle_client_message(&sync, &auth, &mut sub, ClientMessage::Shot { shot: shot() }).await;
        assert_eq!(reply, Some(ServerMessage::ShotAccepted { shot_number: 1 }));
    }

    #[tokio::test]
    async fn test_spectators_cannot_shoot() {
        let (sync, id) = sync_with_match();
        let auth = InMemorySeatAuthorizer::new();
        let mut sub = Subscription::default();

        let reply = handle_client_message(&sync, &auth, &mut sub, ClientMessage::Shot { shot: shot() }).await;
        assert_eq!(error_code(reply), ErrorCode::NotSubscribed);

        let reply = handle_client_message(
            &sync,
            &auth,
            &mut sub,
            ClientMessage::Subscribe {
                match_id: id,
                side: None,
                credential: None,
            },
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::Subscribed { side: None, .. })));

        let reply = handle_client_message(&sync, &auth, &mut sub, ClientMessage::Resign).await;
        assert_eq!(error_code(reply), ErrorCode::NotSubscribed);

        let reply = handle_client_message(
            &sync,
            &auth,
            &mut sub,
            ClientMessage::Subscribe {
                match_id: Uuid::new_v4(),
                side: None,
                credential: None,
            },
        )
        .await;
        assert_eq!(error_code(reply), ErrorCode::MatchNotFound);
    }

    #[tokio::test]
    async fn test_ping() {
        let (sync, _) = sync_with_match();
        let auth = InMemorySeatAuthorizer::open();
        let mut sub = Subscription::default();
        let reply = handle_client_message(&sync, &auth, &mut sub, ClientMessage::Ping { timestamp: 77 }).await;
        assert!(matches!(reply, Some(ServerMessage::Pong { timestamp: 77, .. })));
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let (sync, id) = sync_with_match();
        let gateway = Arc::new(Gateway::new(
            ServerConfig::default(),
            sync,
            Arc::new(InMemorySeatAuthorizer::open()),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.serve(listener).await })
        };

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();

        let subscribe = format!(r#"{{"type":"subscribe","match_id":"{}","side":"p1"}}"#, id);
        ws.send(Message::Text(subscribe)).await.unwrap();
        ws.send(Message::Text(r#"{"type":"shot","direction":[1,0],"power":5000}"#.into()))
            .await
            .unwrap();

        let mut seen_subscribed = false;
        let mut seen_accepted = false;
        let mut seen_state = false;
        let wait = async {
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                seen_subscribed |= text.contains(r#""type":"subscribed""#);
                seen_accepted |= text.contains(r#""type":"shot_accepted""#);
                seen_state |= text.contains(r#""type":"state_update""#);
                if seen_subscribed && seen_accepted && seen_state {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait).await.unwrap();
        assert!(seen_subscribed && seen_accepted && seen_state);
        assert_eq!(gateway.connection_count(), 1);

        gateway.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    }
}
