//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::snapshot::WorldSnapshot;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from a comma-separated origin list; `*` allows any origin
fn cors_layer(client_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.split(',').any(|s| s.trim() == "*") {
        return base.allow_origin(Any);
    }
    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    base.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    sessions: usize,
    #[serde(flatten)]
    world: WorldSnapshot,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let world = state.world.lock().snapshot();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        sessions: state.sessions.len(),
        world,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use crate::config::Config;
    use crate::game::catalog::test_catalog;
    use crate::game::dice::SeededDice;
    use crate::game::hooks::TracingQuestLog;
    use crate::game::{World, WorldSettings};
    use crate::store::JsonPlayerStore;
    use crate::ws::SessionRegistry;

    #[tokio::test]
    async fn health_reports_world_counters() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());
        let sessions = Arc::new(SessionRegistry::new());
        let mut world = World::new(
            test_catalog(),
            WorldSettings::default(),
            Box::new(SeededDice::new(1)),
            Box::new(TracingQuestLog),
            Box::new(store.clone()),
            sessions.clone(),
        );
        let amy = world.new_player("Amy");
        world.login(amy).unwrap();

        let state = AppState::new(
            Config::default(),
            Arc::new(Mutex::new(world)),
            sessions,
            store,
        );
        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.world.online, 1);
        assert_eq!(health.world.engaged, 0);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["online"], 1);
        assert_eq!(json["pending_respawns"], 0);
    }

    #[test]
    fn wildcard_and_listed_origins_build() {
        let _ = cors_layer("*");
        let _ = cors_layer("http://localhost:5173, https://play.example.com");
    }
}
