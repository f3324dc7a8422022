//! Bayeux-subset CometD transport for LMS-compatible control apps (iPeng,
//! Squeezer, Material Skin).
//!
//! A client handshakes to get a client id, subscribes to channel patterns,
//! and long-polls `/meta/connect` for whatever was published to those
//! channels in the meantime. `/slim/subscribe` and `/slim/request` are LMS
//! idioms layered on top: they run a JSON-RPC command immediately and
//! deliver its result over the session's response channel, so a control
//! app gets both an initial snapshot and a live feed from one call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::events::{Event, EventHandler};
use crate::protocol_constants::{COMETD_HEARTBEAT_SECS, COMETD_SESSION_TIMEOUT_SECS, COMETD_STREAM_MAX_SECS};

/// Dispatches a `[player_id, command_array]` JSON-RPC call. Boxed so
/// `CometdManager` has no compile-time dependency on the concrete
/// dispatcher type.
pub type JsonRpcDispatch = Arc<dyn Fn(String, Vec<Value>) -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync>;

struct CometdClient {
    subscriptions: parking_lot::Mutex<Vec<String>>,
    pending: parking_lot::Mutex<Vec<Value>>,
    wake: Notify,
    last_seen: parking_lot::Mutex<Instant>,
}

impl CometdClient {
    fn new() -> Self {
        Self {
            subscriptions: parking_lot::Mutex::new(Vec::new()),
            pending: parking_lot::Mutex::new(Vec::new()),
            wake: Notify::new(),
            last_seen: parking_lot::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn is_expired(&self) -> bool {
        self.last_seen.lock().elapsed() > Duration::from_secs(COMETD_SESSION_TIMEOUT_SECS)
    }

    fn add_event(&self, event: Value) {
        self.pending.lock().push(event);
        self.wake.notify_waiters();
    }

    fn drain(&self) -> Vec<Value> {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Manages CometD client sessions and delivers events to subscribers.
pub struct CometdManager {
    clients: DashMap<String, Arc<CometdClient>>,
    jsonrpc: parking_lot::Mutex<Option<JsonRpcDispatch>>,
}

impl Default for CometdManager {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
            jsonrpc: parking_lot::Mutex::new(None),
        }
    }
}

impl CometdManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_jsonrpc_handler(&self, handler: JsonRpcDispatch) {
        *self.jsonrpc.lock() = Some(handler);
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_valid_client(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    fn generate_client_id() -> String {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn get_or_create(&self, client_id: &str) -> Arc<CometdClient> {
        self.clients.entry(client_id.to_string()).or_insert_with(|| Arc::new(CometdClient::new())).clone()
    }

    pub fn handshake(&self, msg_id: Option<&str>) -> Value {
        let client_id = Self::generate_client_id();
        self.clients.insert(client_id.clone(), Arc::new(CometdClient::new()));
        log::debug!("[Cometd] handshake: created client {client_id}");

        json!({
            "id": msg_id.unwrap_or(""),
            "channel": "/meta/handshake",
            "successful": true,
            "clientId": client_id,
            "version": "1.0",
            "supportedConnectionTypes": ["long-polling", "streaming"],
            "advice": { "timeout": 60000, "reconnect": "retry", "interval": 0 },
        })
    }

    /// Long-poll `/meta/connect`: waits up to `timeout` for an event, then
    /// returns the connect acknowledgement followed by whatever drained.
    /// An unknown client id is tolerated for `/meta/reconnect` — real
    /// devices reconnect across server restarts carrying their old id.
    pub async fn connect(&self, client_id: &str, msg_id: Option<&str>, wait: Duration, auto_create: bool) -> Vec<Value> {
        let client = match self.clients.get(client_id) {
            Some(c) => c.clone(),
            None if auto_create => {
                log::warn!("[Cometd] auto-creating session for unknown client {client_id} on reconnect");
                self.get_or_create(client_id)
            }
            None => {
                return vec![json!({
                    "channel": "/meta/connect",
                    "successful": false,
                    "error": "invalid clientId",
                    "advice": { "reconnect": "handshake" },
                })];
            }
        };

        client.touch();

        let mut events = client.drain();
        if events.is_empty() {
            let _ = timeout(wait, client.wake.notified()).await;
            events = client.drain();
        }

        let mut response = json!({
            "channel": "/meta/connect",
            "successful": true,
            "clientId": client_id,
        });
        if let Some(id) = msg_id {
            response["id"] = json!(id);
        }

        let mut out = vec![response];
        out.extend(events);
        out
    }

    /// Streaming-mode `/meta/connect`: yields batches of pending events (or
    /// a `/meta/ping` heartbeat every [`COMETD_HEARTBEAT_SECS`] of silence)
    /// for up to [`COMETD_STREAM_MAX_SECS`], then ends the response.
    pub fn connect_stream(self: &Arc<Self>, client_id: String) -> impl futures::Stream<Item = Vec<Value>> {
        let manager = self.clone();
        async_stream::stream! {
            let Some(client) = manager.clients.get(&client_id).map(|c| c.clone()) else {
                return;
            };
            let deadline = Instant::now() + Duration::from_secs(COMETD_STREAM_MAX_SECS);
            loop {
                if Instant::now() >= deadline || !manager.clients.contains_key(&client_id) {
                    break;
                }
                client.touch();
                match timeout(Duration::from_secs(1), client.wake.notified()).await {
                    Ok(()) => {
                        let events = client.drain();
                        if !events.is_empty() {
                            yield events;
                        }
                    }
                    Err(_) => {
                        yield vec![json!({ "channel": "/meta/ping", "successful": true })];
                        tokio::time::sleep(Duration::from_secs(COMETD_HEARTBEAT_SECS - 1)).await;
                    }
                }
            }
        }
    }

    pub fn disconnect(&self, client_id: &str, msg_id: Option<&str>) -> Value {
        let removed = self.clients.remove(client_id);
        let mut response = json!({
            "channel": "/meta/disconnect",
            "successful": removed.is_some(),
            "clientId": client_id,
        });
        if removed.is_none() {
            response["error"] = json!("Unknown client ID");
        }
        if let Some(id) = msg_id {
            response["id"] = json!(id);
        }
        response
    }

    pub fn subscribe(&self, client_id: &str, channels: &[String], msg_id: Option<&str>) -> Vec<Value> {
        let Some(client) = self.clients.get(client_id) else {
            return vec![json!({
                "channel": "/meta/subscribe",
                "successful": false,
                "error": "invalid clientId",
            })];
        };
        client.touch();

        channels
            .iter()
            .map(|channel| {
                client.subscriptions.lock().push(channel.clone());
                let mut resp = json!({
                    "channel": "/meta/subscribe",
                    "successful": true,
                    "clientId": client_id,
                    "subscription": channel,
                });
                if let Some(id) = msg_id {
                    resp["id"] = json!(id);
                }
                resp
            })
            .collect()
    }

    pub fn unsubscribe(&self, client_id: &str, channels: &[String], msg_id: Option<&str>) -> Vec<Value> {
        let Some(client) = self.clients.get(client_id) else {
            return vec![json!({
                "channel": "/meta/unsubscribe",
                "successful": false,
                "error": "invalid clientId",
            })];
        };
        client.touch();

        channels
            .iter()
            .map(|channel| {
                client.subscriptions.lock().retain(|c| c != channel);
                let mut resp = json!({
                    "channel": "/meta/unsubscribe",
                    "successful": true,
                    "clientId": client_id,
                    "subscription": channel,
                });
                if let Some(id) = msg_id {
                    resp["id"] = json!(id);
                }
                resp
            })
            .collect()
    }

    /// `/slim/subscribe`: subscribes the response channel, runs the
    /// embedded request immediately, and delivers the result there too.
    /// Tolerates an unknown client id — Boom/Jive devices embed their id
    /// only in `data.response` and may never have handshaken in this
    /// process's lifetime.
    pub async fn slim_subscribe(&self, client_id: &str, response_channel: Option<&str>, request: Option<(String, Vec<Value>)>, msg_id: Option<&str>) -> Value {
        let client = self.clients.get(client_id).map(|c| c.clone()).unwrap_or_else(|| {
            log::warn!("[Cometd] auto-created missing client {client_id} from /slim/subscribe");
            self.get_or_create(client_id)
        });
        client.touch();

        if let Some(channel) = response_channel {
            client.subscriptions.lock().push(channel.to_string());
        }

        if let (Some((player_id, command)), Some(channel)) = (request, response_channel) {
            if let Some(dispatch) = self.jsonrpc.lock().clone() {
                let result = dispatch(player_id, command).await;
                if !result.is_null() {
                    client.add_event(json!({ "channel": channel, "id": msg_id, "data": result }));
                }
            }
        }

        let mut resp = json!({ "channel": "/slim/subscribe", "successful": true, "clientId": client_id });
        if let Some(id) = msg_id {
            resp["id"] = json!(id);
        }
        resp
    }

    pub fn slim_unsubscribe(&self, client_id: &str, channel: Option<&str>, msg_id: Option<&str>) -> Value {
        let client = self.clients.get(client_id).map(|c| c.clone()).unwrap_or_else(|| {
            log::warn!("[Cometd] auto-created missing client {client_id} from /slim/unsubscribe");
            self.get_or_create(client_id)
        });
        client.touch();
        if let Some(channel) = channel {
            client.subscriptions.lock().retain(|c| c != channel);
        }

        let mut resp = json!({ "channel": "/slim/unsubscribe", "successful": true, "clientId": client_id });
        if let Some(id) = msg_id {
            resp["id"] = json!(id);
        }
        resp
    }

    /// `/slim/request`: runs a command once and delivers the result on
    /// `response_channel` for streaming clients, returning only an
    /// acknowledgement inline.
    pub async fn slim_request(&self, client_id: &str, player_id: String, command: Vec<Value>, response_channel: Option<&str>, msg_id: Option<&str>) -> Value {
        let client = self.clients.get(client_id).map(|c| c.clone()).unwrap_or_else(|| {
            log::warn!("[Cometd] auto-created missing client {client_id} from /slim/request");
            self.get_or_create(client_id)
        });
        client.touch();

        let mut has_error = false;
        if let Some(dispatch) = self.jsonrpc.lock().clone() {
            let result = dispatch(player_id, command).await;
            if result.get("error").is_some() {
                has_error = true;
            }
            if let Some(channel) = response_channel {
                if !result.is_null() {
                    client.add_event(json!({ "channel": channel, "id": msg_id, "data": result }));
                }
            }
        }

        let mut resp = json!({ "channel": "/slim/request", "successful": !has_error, "clientId": client_id });
        if let Some(id) = msg_id {
            resp["id"] = json!(id);
        }
        resp
    }

    /// Delivers `data` on `channel` to every client subscribed via a
    /// matching pattern. Returns how many clients received it.
    pub fn deliver_event(&self, channel: &str, data: Value) -> usize {
        let event = json!({ "channel": channel, "data": data });
        let mut delivered = 0;
        for entry in self.clients.iter() {
            let matches = entry.value().subscriptions.lock().iter().any(|pattern| channel_matches(channel, pattern));
            if matches {
                entry.value().add_event(event.clone());
                delivered += 1;
            }
        }
        delivered
    }

    /// Drops sessions that haven't been touched within the session
    /// timeout. Intended to be called periodically by a background task.
    pub fn reap_expired(&self) -> usize {
        let expired: Vec<String> = self.clients.iter().filter(|e| e.value().is_expired()).map(|e| e.key().clone()).collect();
        for id in &expired {
            self.clients.remove(id);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}

/// Matches a channel against a Bayeux subscription pattern: exact string,
/// `*` for exactly one segment, or `**` for zero or more trailing segments.
#[must_use]
pub fn channel_matches(channel: &str, pattern: &str) -> bool {
    if pattern == channel {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return channel == prefix || channel.starts_with(&format!("{prefix}/"));
    }
    if !pattern.contains('*') {
        return false;
    }
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let channel_parts: Vec<&str> = channel.split('/').collect();
    if pattern_parts.len() != channel_parts.len() {
        return false;
    }
    pattern_parts.iter().zip(channel_parts.iter()).all(|(p, c)| *p == "*" && !c.is_empty() || p == c)
}

/// Bridges `EventBus` publishes to CometD channels: player status goes to
/// `/<mac>/status`, connect/disconnect to `/players`.
pub struct CometdEventBridge {
    pub manager: Arc<CometdManager>,
}

#[async_trait]
impl EventHandler for CometdEventBridge {
    async fn handle(&self, event: &Event) {
        match event {
            Event::PlayerStatus { player_id, .. } => {
                let payload = serde_json::to_value(event).unwrap_or(Value::Null);
                self.manager.deliver_event(&format!("/{player_id}/status"), payload);
            }
            Event::PlayerConnected { player_id, .. } => {
                self.manager.deliver_event("/players", json!({ "event": "connected", "player_id": player_id }));
            }
            Event::PlayerDisconnected { player_id } => {
                self.manager.deliver_event("/players", json!({ "event": "disconnected", "player_id": player_id }));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches() {
        assert!(channel_matches("/players", "/players"));
    }

    #[test]
    fn single_wildcard_matches_one_segment_only() {
        assert!(channel_matches("/aa:bb/status", "/*/status"));
        assert!(!channel_matches("/aa:bb/status/extra", "/*/status"));
    }

    #[test]
    fn double_wildcard_matches_zero_or_more_segments() {
        assert!(channel_matches("/foo", "/foo/**"));
        assert!(channel_matches("/foo/bar/baz", "/foo/**"));
        assert!(!channel_matches("/other", "/foo/**"));
    }

    #[tokio::test]
    async fn handshake_then_subscribe_then_deliver_is_visible_on_connect() {
        let manager = CometdManager::new();
        let handshake = manager.handshake(None);
        let client_id = handshake["clientId"].as_str().unwrap().to_string();

        manager.subscribe(&client_id, &["/players".to_string()], None);
        manager.deliver_event("/players", json!({"event": "connected"}));

        let messages = manager.connect(&client_id, None, Duration::from_millis(50), false).await;
        assert!(messages.len() >= 2);
    }

    #[tokio::test]
    async fn slim_subscribe_auto_creates_unknown_client() {
        let manager = CometdManager::new();
        let resp = manager.slim_subscribe("unseen-client", Some("/unseen-client/slim/request"), None, None).await;
        assert_eq!(resp["successful"], true);
        assert!(manager.is_valid_client("unseen-client"));
    }
}
