//! Breakshot Match Server
//!
//! Runs a seeded AI-vs-AI demo match, proves it by replay, and with
//! `--serve` starts the WebSocket gateway.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use breakshot::{
    ai::choose_shot,
    core::{hash::to_hex, rng::derive_match_seed},
    game::Engine,
    network::{
        Gateway, InMemoryEngineStore, InMemoryEventPublisher, InMemorySeatAuthorizer,
        InMemorySessionRepository, ServerConfig, SyncConfig, SyncService,
    },
    replay::{verify_claim, ClaimedResult, MatchMetadata, ShotLogEntry, ShotTrigger},
    VERSION,
};

/// Demo matches stop here if nobody has won.
const DEMO_SHOT_LIMIT: usize = 150;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Breakshot Server v{}", VERSION);

    let sync_config = SyncConfig::from_env();
    demo_match(&sync_config)?;

    if std::env::args().any(|a| a == "--serve") {
        serve(sync_config).await?;
    }
    Ok(())
}

/// AI plays both seats; the log is then replayed and checked against the
/// live result.
fn demo_match(config: &SyncConfig) -> Result<()> {
    info!("=== Starting Demo Match ===");

    let match_id = Uuid::new_v4();
    let seed = derive_match_seed(match_id.as_bytes(), &["demo-p1", "demo-p2"]);
    let mut metadata = MatchMetadata::new(seed, config.default_scale, Some(60), 1800)?;
    let mut engine = Engine::new(seed, metadata.adjustment_scale)?;

    info!("Match ID: {}", match_id);
    info!("Seed: {}", seed);

    while !engine.is_over() && metadata.shot_log.len() < DEMO_SHOT_LIMIT {
        let side = engine.turn();
        let input = choose_shot(&engine.snapshot(), side, 60)?;
        let raw = input.to_raw();
        let result = engine.apply_shot(side, &input, None)?;

        let entry = ShotLogEntry::new(metadata.next_seq(), Utc::now(), side, &raw, ShotTrigger::Ai);
        metadata.shot_log.push(entry);

        if !result.pocketed.is_empty() || !result.fouls.is_empty() {
            info!(
                "#{} {}: pocketed {:?}, fouls {:?}",
                metadata.shot_log.len(),
                side,
                result.pocketed,
                result.fouls
            );
        }
    }

    let rules = engine.rules();
    match rules.winner {
        Some(winner) => info!("Winner: {} ({} - {})", winner, rules.p1_score, rules.p2_score),
        None => warn!("No winner after {} shots", metadata.shot_log.len()),
    }

    let live_hash = to_hex(&engine.state_hash());
    info!("Live State Hash: {}", live_hash);

    let claim = ClaimedResult {
        p1_score: rules.p1_score,
        p2_score: rules.p2_score,
        winner: rules.winner,
    };
    let verification = verify_claim(&metadata, &claim).context("demo replay diverged")?;
    info!("Replay State Hash: {}", verification.state_hash);

    if verification.state_hash != live_hash || !verification.matches_claim() {
        bail!("replay does not reproduce the live match");
    }
    info!("DETERMINISM VERIFIED: replay matches ({} shots)", verification.shots);
    Ok(())
}

async fn serve(sync_config: SyncConfig) -> Result<()> {
    let sync = SyncService::new(
        sync_config,
        Arc::new(InMemoryEngineStore::new()),
        Arc::new(InMemorySessionRepository::new()),
        Arc::new(InMemoryEventPublisher::new()),
    );
    let expiry = sync.spawn_expiry_loop();

    let gateway = Arc::new(Gateway::new(
        ServerConfig::from_env(),
        sync,
        Arc::new(InMemorySeatAuthorizer::open()),
    ));

    let server = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    gateway.shutdown();
    expiry.abort();
    server.await??;
    Ok(())
}
