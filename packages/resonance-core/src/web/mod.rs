//! HTTP surface: `/stream.mp3`, `/jsonrpc.js`, and `/cometd`.
//!
//! Three routes, three protocols, one shared [`AppState`]: Slimproto
//! devices fetch audio from `/stream.mp3`, control apps issue commands
//! through `/jsonrpc.js`, and the subset that speaks Bayeux long-polls or
//! streams `/cometd` for live updates.

pub mod cometd;
pub mod handlers;
pub mod jsonrpc;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::library::Library;
use crate::player::PlayerRegistry;
use crate::playlist::PlaylistManager;
use crate::streaming::{DeviceConfig, SeekCoordinator, SeekExecutor, StreamingCoordinator, TranscodeConfig, TranscodePolicy};
use cometd::CometdManager;
use jsonrpc::JsonRpcHandler;

/// Shared state every HTTP handler is given through axum's `State`
/// extractor. Cheap to clone: every field is an `Arc` or a small owned
/// value.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PlayerRegistry>,
    pub playlists: Arc<PlaylistManager>,
    pub library: Arc<dyn Library>,
    pub streaming: Arc<StreamingCoordinator>,
    pub seek: Arc<SeekCoordinator>,
    pub seek_executor: Arc<dyn SeekExecutor>,
    pub device_config: Arc<DeviceConfig>,
    pub transcode_policy: Arc<TranscodePolicy>,
    pub transcode_config: Arc<TranscodeConfig>,
    pub third_party_bin_dir: String,
    pub cometd: Arc<CometdManager>,
    pub jsonrpc: Arc<JsonRpcHandler>,
    pub cometd_connect_timeout_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub server_uuid: String,
}

/// Builds the router: `/stream.mp3` for audio, `/jsonrpc.js` for one-shot
/// commands, `/cometd` for the Bayeux long-poll/streaming surface.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stream.mp3", get(stream::stream_mp3))
        .route("/jsonrpc.js", post(jsonrpc_handler))
        .route("/cometd", post(cometd_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn jsonrpc_handler(State(state): State<AppState>, Json(request): Json<Value>) -> Json<Value> {
    Json(state.jsonrpc.handle_request(&request).await)
}

/// Extracts a Bayeux `subscription` field, which may be a single channel
/// string or an array of them.
fn extract_channels(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Extracts the `(player_id, command)` pair LMS embeds at `data.request`
/// for `/slim/subscribe` and `/slim/request` messages.
fn extract_request(data: &Value) -> Option<(String, Vec<Value>)> {
    let request = data.get("request")?.as_array()?;
    let player_id = request.first()?.as_str()?.to_string();
    let command = request.get(1)?.as_array()?.clone();
    Some((player_id, command))
}

async fn handle_bayeux_message(state: &AppState, msg: &Value) -> Vec<Value> {
    let channel = msg.get("channel").and_then(Value::as_str).unwrap_or_default();
    let msg_id = msg.get("id").and_then(Value::as_str);
    let client_id = msg.get("clientId").and_then(Value::as_str).unwrap_or_default();
    let data = msg.get("data").cloned().unwrap_or(Value::Null);

    match channel {
        "/meta/handshake" => vec![state.cometd.handshake(msg_id)],
        "/meta/connect" => {
            state
                .cometd
                .connect(client_id, msg_id, Duration::from_secs(state.cometd_connect_timeout_secs), true)
                .await
        }
        "/meta/disconnect" => vec![state.cometd.disconnect(client_id, msg_id)],
        "/meta/subscribe" => {
            let channels = msg.get("subscription").map(extract_channels).unwrap_or_default();
            state.cometd.subscribe(client_id, &channels, msg_id)
        }
        "/meta/unsubscribe" => {
            let channels = msg.get("subscription").map(extract_channels).unwrap_or_default();
            state.cometd.unsubscribe(client_id, &channels, msg_id)
        }
        "/slim/subscribe" => {
            let response_channel = data.get("response").and_then(Value::as_str);
            let request = extract_request(&data);
            vec![state.cometd.slim_subscribe(client_id, response_channel, request, msg_id).await]
        }
        "/slim/unsubscribe" => {
            let response_channel = data.get("response").and_then(Value::as_str);
            vec![state.cometd.slim_unsubscribe(client_id, response_channel, msg_id)]
        }
        "/slim/request" => match extract_request(&data) {
            Some((player_id, command)) => {
                let response_channel = data.get("response").and_then(Value::as_str);
                vec![state.cometd.slim_request(client_id, player_id, command, response_channel, msg_id).await]
            }
            None => vec![json!({ "channel": "/slim/request", "successful": false, "error": "missing data.request", "id": msg_id })],
        },
        other => vec![json!({ "channel": other, "successful": false, "error": format!("402:channel:Unknown channel {other}"), "id": msg_id })],
    }
}

async fn cometd_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let messages = match body {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut responses = Vec::with_capacity(messages.len());
    for msg in &messages {
        responses.extend(handle_bayeux_message(&state, msg).await);
    }

    Json(Value::Array(responses))
}
