//! Champion Arena Server
//!
//! Runs the WebSocket match server, or `demo` for a headless match.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use champion_arena::{
    VERSION,
    core::rng::derive_session_seed,
    game::{
        events::GameEventData,
        state::{Attributes, ChampionProfile, MatchState, ParticipantId},
        tick::{simulate_match, MatchConfig, StartMode},
    },
    network::{GameServer, ServerConfig},
    store::InMemoryChampionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Champion Arena Server v{}", VERSION);

    if std::env::args().nth(1).as_deref() == Some("demo") {
        return demo_match();
    }

    let config = ServerConfig::from_env();
    info!(
        "Start mode {:?}, {} rounds max, teardown after {:?}",
        config.session.match_config.start_mode,
        config.session.match_config.max_rounds,
        config.session.teardown_grace,
    );

    let server = Arc::new(GameServer::new(config, Arc::new(InMemoryChampionStore::new())));

    let running = server.clone();
    let serve = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = serve => {
            result.context("server task panicked")?.context("server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

fn sample_champions() -> [ChampionProfile; 2] {
    [
        ChampionProfile {
            id: ParticipantId::new("brakka"),
            name: "Brakka".to_string(),
            attributes: Attributes {
                strength: 42.0,
                agility: 18.0,
                hardiness: 30.0,
                stamina: 26.0,
                intelligence: 8.0,
                unarmed_skill: 35.0,
                weapon_skill: 22.0,
                survival_skill: 12.0,
            },
        },
        ChampionProfile {
            id: ParticipantId::new("sela"),
            name: "Sela".to_string(),
            attributes: Attributes {
                strength: 24.0,
                agility: 38.0,
                hardiness: 20.0,
                stamina: 30.0,
                intelligence: 25.0,
                unarmed_skill: 15.0,
                weapon_skill: 40.0,
                survival_skill: 28.0,
            },
        },
    ]
}

fn demo_state(seed: u64) -> anyhow::Result<MatchState> {
    let mut state = MatchState::new(seed).context("standard arena rejected")?;
    for profile in sample_champions() {
        let participant = state.add_participant(profile).context("demo join failed")?;
        info!("{} spawns on the {} side at {}", participant.name, participant.side.as_str(), participant.position);
    }
    Ok(state)
}

/// Headless exploration match between two sample champions.
fn demo_match() -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let session_id = [1u8; 16];
    let seed = derive_session_seed(&session_id, 12345);
    info!("Session: {}", hex::encode(&session_id[..4]));
    info!("RNG Seed: {}", seed);

    let config = MatchConfig { start_mode: StartMode::Exploration, ..MatchConfig::default() };
    let (state, events) = simulate_match(demo_state(seed)?, &config, 0);

    let mut moves = 0;
    for event in &events {
        match &event.data {
            GameEventData::PositionChanged { .. } => moves += 1,
            GameEventData::CombatStarted { position, .. } => {
                info!("Combat starts at {:?} after {} moves", position, moves);
            }
            GameEventData::DamageDealt { attacker, defender, damage, remaining_health, .. } => {
                info!("Round {}: {} hits {} for {} ({} left)", event.round, attacker, defender, damage, remaining_health);
            }
            GameEventData::MatchEnded { outcome, .. } => {
                info!("Match ended: {:?}", outcome);
            }
            _ => {}
        }
    }

    info!("=== Match Results ===");
    for participant in &state.participants {
        info!("{}: {}/{} health", participant.name, participant.current_health, participant.max_health);
    }
    info!("Total events: {}", events.len());

    info!("=== Verifying Determinism ===");
    let (_, replay_events) = simulate_match(demo_state(seed)?, &config, 0);
    if replay_events == events {
        info!("DETERMINISM VERIFIED: event streams match");
    } else {
        info!("DETERMINISM FAILURE: event streams differ");
    }

    Ok(())
}
