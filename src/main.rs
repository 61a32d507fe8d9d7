mod config;
mod error;
mod game;
mod phase;
mod questions;
mod room;
mod roster;
mod scores;
mod types;

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::game::{GameCommand, GameHandle, Membership};
use crate::types::*;

#[derive(Clone)]
struct AppState {
    game: GameHandle,
}

// ─── Routes ───────────────────────────────────────────────────────

async fn index_page() -> impl IntoResponse {
    "Catch Mind Server is Running!"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Map an inbound frame to the session command it triggers.
fn to_command(socket_id: &str, msg: ClientMsg) -> GameCommand {
    let socket_id = socket_id.to_string();
    match msg {
        ClientMsg::GetCode => GameCommand::GetCode { socket_id },
        ClientMsg::VerifyCode { code } => GameCommand::VerifyCode { socket_id, code },
        ClientMsg::AdminJoin => GameCommand::AdminJoin { socket_id },
        ClientMsg::Join(request) => GameCommand::Join { socket_id, request },
        ClientMsg::StartGame => GameCommand::StartGame { socket_id },
        ClientMsg::RequestStartStatus => GameCommand::RequestStartStatus { socket_id },
        ClientMsg::RequestPlayerList => GameCommand::RequestPlayerList { socket_id },
        ClientMsg::SubmitAnswer { guess } => GameCommand::SubmitAnswer { socket_id, guess },
        ClientMsg::GameTimeOver => GameCommand::GameTimeOver { socket_id },
        ClientMsg::ResetGame => GameCommand::ResetGame { socket_id },
        ClientMsg::Draw { data } => GameCommand::Relay {
            socket_id,
            msg: ServerMsg::Draw { data },
        },
        ClientMsg::ClearCanvas => GameCommand::Relay {
            socket_id,
            msg: ServerMsg::ClearCanvas,
        },
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let socket_id = uuid::Uuid::new_v4().to_string();
    info!(socket_id = %socket_id, "WebSocket connected");

    // Subscribe before any command is sent so no reply addressed to this socket is missed.
    let mut event_rx = state.game.event_tx.subscribe();

    // Spawn a task that listens for session events and forwards the ones for this socket
    let socket_id_clone = socket_id.clone();
    let cmd_tx = state.game.cmd_tx.clone();
    let event_task = tokio::spawn(async move {
        let mut membership = Membership::default();
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let Some(msg) = membership.route(&socket_id_clone, &event) else {
                        continue;
                    };
                    if let Ok(json) = serde_json::to_string(msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(socket_id = %socket_id_clone, skipped, "event stream lagged; requesting resync");
                    let resync = GameCommand::Resync {
                        socket_id: socket_id_clone.clone(),
                    };
                    if cmd_tx.send(resync).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    // Process incoming messages
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!(socket_id = %socket_id, error = %e, "invalid message");
                continue;
            }
        };
        debug!(socket_id = %socket_id, msg = ?client_msg, "received");

        if state
            .game
            .cmd_tx
            .send(to_command(&socket_id, client_msg))
            .await
            .is_err()
        {
            warn!("session task is gone; closing socket");
            break;
        }
    }

    // Socket disconnected
    info!(socket_id = %socket_id, "WebSocket disconnected");
    event_task.abort();

    let _ = state
        .game
        .cmd_tx
        .send(GameCommand::Disconnect { socket_id })
        .await;
}

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    config::init().context("initializing config directory")?;
    let game_config = config::load_game_config().context("loading game config")?;
    let questions = config::load_questions().context("loading question bank")?;

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("invalid PORT")?;

    let state = AppState {
        game: game::spawn_session(game_config, questions),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding server")?;

    info!(%addr, "Catch Mind server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Configure tracing subscribers; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
