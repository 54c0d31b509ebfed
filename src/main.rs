//! Hearthmud Server - persistent-world text game with shared-room combat
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket sessions carrying player commands and narrative output
//! - The world heartbeat driving combat, respawns and regeneration
//! - Background persistence of player saves

mod app;
mod config;
mod game;
mod http;
mod store;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::dice::SeededDice;
use crate::game::hooks::TracingQuestLog;
use crate::game::{Catalog, World};
use crate::http::build_router;
use crate::store::JsonPlayerStore;
use crate::util::time::init_server_time;
use crate::ws::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Hearthmud Server");
    info!("Server address: {}", config.server_addr);

    // World content
    let catalog = match &config.content_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("loading world from {}", path.display()))?,
        None => Catalog::builtin().context("loading built-in world")?,
    };
    info!(
        areas = catalog.areas.len(),
        enemies = catalog.enemies.len(),
        items = catalog.items.len(),
        "World content loaded"
    );

    let dice = match config.rng_seed {
        Some(seed) => SeededDice::new(seed),
        None => SeededDice::from_entropy(),
    };
    info!(seed = dice.seed(), "Dice seeded");

    // Persistence writer
    let (store, writer) = JsonPlayerStore::spawn(config.save_dir.clone());
    info!(dir = %store.dir().display(), "Player saves");

    // Create world and application state
    let sessions = Arc::new(SessionRegistry::new());
    let world = World::new(
        catalog,
        config.world_settings(),
        Box::new(dice),
        Box::new(TracingQuestLog),
        Box::new(store.clone()),
        sessions.clone(),
    );
    let state = AppState::new(config.clone(), Arc::new(Mutex::new(world)), sessions, store);

    // Start the heartbeat
    state.register_tick_handlers();
    state.ticks.start();

    // Build router
    let router = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws?name=<name>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop ticking, then save everyone still online
    state.ticks.stop();
    state.world.lock().save_all();
    if let Err(e) = state.store.flush().await {
        warn!(error = %e, "Save writer did not drain");
    }
    drop(state);
    writer.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
