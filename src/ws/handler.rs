//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::world::normalize_name;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Character name to play
    pub name: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match normalize_name(&query.name) {
        Ok(name) => {
            info!(player = %name, "WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_socket(socket, name, state))
        }
        Err(e) => {
            warn!(name = %query.name, error = %e, "Rejected connection");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, name: String, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(player = %name, session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMsg>();

    if !state.sessions.register(&name, tx.clone()) {
        let _ = send_msg(
            &mut ws_sink,
            &ServerMsg::error("already_online", format!("{} is already playing.", name)),
        )
        .await;
        return;
    }

    let saved = match state.store.load(&name).await {
        Ok(saved) => saved,
        Err(e) => {
            error!(player = %name, error = %e, "Failed to load player");
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::error("load_failed", "Your character could not be loaded."),
            )
            .await;
            state.sessions.unregister(&name);
            return;
        }
    };
    let player = match saved {
        Some(player) => player,
        None => {
            info!(player = %name, "Creating new character");
            state.world.lock().new_player(&name)
        }
    };

    // Welcome goes out before any world output queued by login
    let _ = tx.send(ServerMsg::Welcome {
        name: name.clone(),
        server_time: unix_millis(),
    });

    let writer_name = name.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player = %writer_name, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let login = state.world.lock().login(player);
    if let Err(e) = login {
        warn!(player = %name, error = %e, "Login refused");
        let _ = tx.send(ServerMsg::error("already_online", e.to_string()));
        state.sessions.unregister(&name);
        drop(tx);
        let _ = writer_handle.await;
        return;
    }

    run_session(&name, &state, &tx, &mut ws_stream).await;

    state.world.lock().logout(&name);
    state.sessions.unregister(&name);
    drop(tx);
    writer_handle.abort();

    info!(player = %name, session_id = %session_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> world
async fn run_session(
    name: &str,
    state: &AppState,
    tx: &mpsc::UnboundedSender<ServerMsg>,
    ws_stream: &mut futures::stream::SplitStream<WebSocket>,
) {
    let rate_limiter = SessionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_command() {
                    warn!(player = %name, "Rate limited command");
                    let _ = tx.send(ServerMsg::error("rate_limited", "Slow down."));
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Command { line }) => {
                        state.world.lock().handle_command(name, &line);
                    }
                    Ok(ClientMsg::Ping { t }) => {
                        let _ = tx.send(ServerMsg::Pong { t });
                    }
                    Err(e) => {
                        warn!(player = %name, error = %e, "Failed to parse client message");
                        let _ = tx.send(ServerMsg::error("bad_message", "Unrecognized message."));
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player = %name, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player = %name, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player = %name, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
