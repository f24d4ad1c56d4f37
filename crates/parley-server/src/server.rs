use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use parley_core::archive::ArchiveStore;
use parley_core::verify::IdentityVerifier;

use crate::bridge;
use crate::connection;
use crate::lifecycle::{self, ChatState, Controller};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_send_queue: 256,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatState>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{token}", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    verifier: Arc<dyn IdentityVerifier>,
    archive: Arc<dyn ArchiveStore>,
) -> Result<ServerHandle, std::io::Error> {
    let (chat, events_rx) = ChatState::new(config.max_send_queue);

    let bridge_handle = bridge::create_bridge(archive, events_rx);
    let sweep_handle = start_sweep_task(Arc::clone(&chat), config.sweep_interval);

    let app_state = AppState {
        chat: Arc::clone(&chat),
        verifier,
    };
    let router = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), "parley server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        chat,
        _server: server_handle,
        _bridge: bridge_handle,
        _sweep: sweep_handle,
    })
}

/// Handle returned by `start()`. Keeps the background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub chat: Arc<ChatState>,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _sweep: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler. The credential rides in the path, as in the
/// original wire format.
async fn ws_handler(
    Path(token): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, token, state))
}

/// Verify the credential, then hand the socket to its connection task.
/// A failed verification closes with the policy-violation code and creates
/// no state.
async fn handle_socket(socket: WebSocket, token: String, state: AppState) {
    match state.verifier.verify(&token).await {
        Ok(identity) => lifecycle::run_connection(socket, identity, state.chat).await,
        Err(e) => {
            warn!(error = %e, "admission refused");
            connection::close_policy_violation(socket, "invalid credential").await;
        }
    }
}

/// Liveness probe with the core gauges.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "connected": state.chat.clients.count(),
        "waiting": state.chat.pairing.len(),
        "active_sessions": state.chat.sessions.len(),
    }))
}

/// Periodically disconnect clients that stopped answering pings. Runs the
/// normal disconnect path so waiting-list and session cleanup apply.
fn start_sweep_task(state: Arc<ChatState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for identity in state.clients.stale_identities() {
                info!(identity = %identity, "reaping unresponsive connection");
                Controller::new(Arc::clone(&state), identity).handle_disconnect();
            }
        }
    })
}
