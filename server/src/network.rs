//! HTTP and WebSocket gateway.
//!
//! One router serves the whole surface: `/ws` upgrades into a courtroom
//! connection, `/api/token` brokers the OAuth code exchange so the
//! client secret never ships to browsers, `/api/interactions` receives
//! slash commands, and `/health` answers liveness probes.
//!
//! Each WebSocket gets a dedicated writer task draining its outbound
//! queue, so a slow client backs up only its own channel and a room
//! broadcast never blocks on socket I/O.

use std::env;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use shared::ClientMessage;

use crate::interactions;
use crate::registry::RoomRegistry;
use crate::room::Room;

const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";

/// Credentials and endpoints pulled from the environment at startup.
#[derive(Clone, Default)]
pub struct ServerConfig {
    pub client_id: String,
    pub client_secret: String,
    pub public_key: String,
    pub bot_token: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: env::var("DISCORD_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("DISCORD_CLIENT_SECRET").unwrap_or_default(),
            public_key: env::var("DISCORD_PUBLIC_KEY").unwrap_or_default(),
            bot_token: env::var("DISCORD_BOT_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub http: reqwest::Client,
    pub config: Arc<ServerConfig>,
}

/// Query parameters carried on the `/ws` upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    pub channel_id: Option<String>,
}

fn default_user_id() -> String {
    "anon".to_string()
}

fn default_instance_id() -> String {
    "default".to_string()
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .route("/api/token", post(token_exchange))
        .route("/api/interactions", post(interactions::handle))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Runs one courtroom connection from admission to cleanup.
async fn handle_socket(socket: WebSocket, params: ConnectParams, state: AppState) {
    let conn = state.registry.next_conn_id();
    info!(
        "Connection {}: user {} joining instance {}",
        conn, params.user_id, params.instance_id
    );

    let room = state.registry.get_or_create(&params.instance_id).await;
    let pending = match params.channel_id.as_deref() {
        Some(channel) => state.registry.take_pending(channel).await,
        None => None,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    Room::admit(
        &room,
        conn,
        params.user_id.clone(),
        tx,
        params.channel_id.clone(),
        pending,
    )
    .await;

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => Room::dispatch(&room, &params.user_id, msg).await,
                Err(e) => {
                    warn!("Connection {}: skipping malformed message: {}", conn, e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {}: socket error: {}", conn, e);
                break;
            }
        }
    }

    Room::remove(&room, conn).await;
    state.registry.cleanup(&params.instance_id).await;
    writer.abort();
    info!("Connection {} closed", conn);
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub code: String,
}

/// Exchanges an OAuth authorization code for an access token on behalf
/// of the client, keeping the client secret server-side.
async fn token_exchange(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> (StatusCode, Json<Value>) {
    let form = [
        ("client_id", state.config.client_id.as_str()),
        ("client_secret", state.config.client_secret.as_str()),
        ("grant_type", "authorization_code"),
        ("code", req.code.as_str()),
    ];

    let response = state.http.post(DISCORD_TOKEN_URL).form(&form).send().await;
    match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                warn!("Token exchange returned unreadable body: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid token response" })),
                )
            }
        },
        Ok(resp) => {
            warn!("Token exchange rejected upstream: {}", resp.status());
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "token exchange failed" })),
            )
        }
        Err(e) => {
            warn!("Token exchange request failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "token exchange failed" })),
            )
        }
    }
}
