//! LMS-compatible JSON-RPC facade.
//!
//! A single entry point, `slim.request(player_id, command_array)`, backed
//! by a fixed command table. Each handler lives in [`crate::web::handlers`]
//! and is kept thin; this module only does dispatch, parameter-shape
//! validation, and building the per-request [`CommandContext`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use super::handlers::{library, menu, playback, playlist, seeking, status, CommandContext};
use crate::library::Library;
use crate::player::PlayerRegistry;
use crate::playlist::PlaylistManager;
use crate::streaming::{DeviceConfig, SeekCoordinator, SeekExecutor, StreamingCoordinator, TranscodePolicy};

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Value> + Send + 'a>>;
type CommandHandler = for<'a> fn(&'a CommandContext, &'a [Value]) -> HandlerFuture<'a>;

macro_rules! boxed {
    ($f:path) => {
        |ctx, params| Box::pin($f(ctx, params))
    };
}

fn command_table() -> HashMap<&'static str, CommandHandler> {
    let mut table: HashMap<&'static str, CommandHandler> = HashMap::new();
    table.insert("serverstatus", boxed!(status::cmd_serverstatus));
    table.insert("players", boxed!(status::cmd_players));
    table.insert("player", boxed!(status::cmd_player));
    table.insert("status", boxed!(status::cmd_status));
    table.insert("pref", boxed!(status::cmd_pref));
    table.insert("rescan", boxed!(status::cmd_rescan));
    table.insert("wipecache", boxed!(status::cmd_wipecache));
    table.insert("artists", boxed!(library::cmd_artists));
    table.insert("albums", boxed!(library::cmd_albums));
    table.insert("titles", boxed!(library::cmd_titles));
    table.insert("genres", boxed!(library::cmd_genres));
    table.insert("roles", boxed!(library::cmd_roles));
    table.insert("search", boxed!(library::cmd_search));
    table.insert("play", boxed!(playback::cmd_play));
    table.insert("pause", boxed!(playback::cmd_pause));
    table.insert("stop", boxed!(playback::cmd_stop));
    table.insert("mode", boxed!(playback::cmd_mode));
    table.insert("power", boxed!(playback::cmd_power));
    table.insert("mixer", boxed!(playback::cmd_mixer));
    table.insert("button", boxed!(playback::cmd_button));
    table.insert("playlist", boxed!(playlist::cmd_playlist));
    table.insert("time", boxed!(seeking::cmd_time));
    table.insert("menu", boxed!(menu::cmd_menu));
    table.insert("menustatus", boxed!(menu::cmd_menustatus));
    table.insert("browselibrary", boxed!(menu::cmd_browselibrary));
    table.insert("playlistcontrol", boxed!(menu::cmd_playlistcontrol));
    table.insert("date", boxed!(menu::cmd_date));
    table.insert("alarmsettings", boxed!(menu::cmd_alarm_settings));
    table.insert("sleepsettings", boxed!(menu::cmd_sleep_settings));
    table.insert("syncsettings", boxed!(menu::cmd_sync_settings));
    table.insert("firmwareupgrade", boxed!(menu::cmd_firmwareupgrade));
    table.insert("playerinfo", boxed!(menu::cmd_playerinfo));
    table
}

/// Dependencies `JsonRpcHandler` threads into every dispatched command as
/// a fresh [`CommandContext`].
pub struct JsonRpcHandler {
    table: HashMap<&'static str, CommandHandler>,
    library: Arc<dyn Library>,
    registry: Arc<PlayerRegistry>,
    playlists: Arc<PlaylistManager>,
    streaming: Arc<StreamingCoordinator>,
    seek: Arc<SeekCoordinator>,
    seek_executor: Arc<dyn SeekExecutor>,
    device_config: Arc<DeviceConfig>,
    transcode_policy: Arc<TranscodePolicy>,
    server_host: String,
    server_port: u16,
    server_uuid: String,
}

impl JsonRpcHandler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        library: Arc<dyn Library>,
        registry: Arc<PlayerRegistry>,
        playlists: Arc<PlaylistManager>,
        streaming: Arc<StreamingCoordinator>,
        seek: Arc<SeekCoordinator>,
        seek_executor: Arc<dyn SeekExecutor>,
        device_config: Arc<DeviceConfig>,
        transcode_policy: Arc<TranscodePolicy>,
        server_host: String,
        server_port: u16,
        server_uuid: String,
    ) -> Self {
        Self {
            table: command_table(),
            library,
            registry,
            playlists,
            streaming,
            seek,
            seek_executor,
            device_config,
            transcode_policy,
            server_host,
            server_port,
            server_uuid,
        }
    }

    fn build_context(&self, player_id: String) -> CommandContext {
        CommandContext {
            player_id,
            registry: self.registry.clone(),
            playlists: self.playlists.clone(),
            library: self.library.clone(),
            streaming: self.streaming.clone(),
            seek: self.seek.clone(),
            seek_executor: self.seek_executor.clone(),
            device_config: self.device_config.clone(),
            transcode_policy: self.transcode_policy.clone(),
            server_host: self.server_host.clone(),
            server_port: self.server_port,
            server_uuid: self.server_uuid.clone(),
        }
    }

    /// Executes a single `[command_name, arg1, arg2, ...]` command for
    /// `player_id` (empty string or `"-"` for server-scoped commands).
    pub async fn execute_command(&self, player_id: String, command: Vec<Value>) -> Value {
        let Some(name) = command.first().and_then(Value::as_str).map(str::to_lowercase) else {
            return json!({ "error": "empty command" });
        };

        let Some(handler) = self.table.get(name.as_str()) else {
            log::warn!("[JsonRpc] unknown command: {name}");
            return json!({ "error": format!("unknown command: {name}") });
        };

        let ctx = self.build_context(player_id);
        handler(&ctx, &command).await
    }

    /// Handles a full JSON-RPC 2.0-shaped request: `{id, method:
    /// "slim.request", params: [player_id, command_array]}`.
    pub async fn handle_request(&self, request: &Value) -> Value {
        let request_id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = request.get("params").and_then(Value::as_array).cloned().unwrap_or_default();

        if method != "slim.request" {
            return json!({
                "id": request_id,
                "method": method,
                "error": { "code": -32601, "message": format!("Unknown method: {method}") },
            });
        }

        let (Some(player_id), Some(command)) = (params.first().and_then(Value::as_str), params.get(1).and_then(Value::as_array)) else {
            return json!({
                "id": request_id,
                "method": method,
                "error": { "code": -32602, "message": "slim.request requires [player_id, command_array]" },
            });
        };

        if command.is_empty() {
            return json!({
                "id": request_id,
                "method": method,
                "error": { "code": -32602, "message": "command must be a non-empty array" },
            });
        }

        let result = self.execute_command(player_id.to_string(), command.clone()).await;
        json!({ "id": request_id, "method": method, "params": params, "result": result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EmptyLibrary;
    use crate::streaming::SeekExecutor;
    use async_trait::async_trait;

    struct NoopExecutor;
    #[async_trait]
    impl SeekExecutor for NoopExecutor {
        async fn execute_seek(&self, _player: &crate::player::PlayerIdentity, _seconds: f64) {}
    }

    fn test_handler() -> JsonRpcHandler {
        JsonRpcHandler::new(
            Arc::new(EmptyLibrary),
            Arc::new(PlayerRegistry::new()),
            Arc::new(PlaylistManager::new()),
            Arc::new(StreamingCoordinator::new()),
            Arc::new(SeekCoordinator::new()),
            Arc::new(NoopExecutor),
            Arc::new(DeviceConfig::default()),
            Arc::new(TranscodePolicy::new()),
            "127.0.0.1".to_string(),
            9000,
            "resonance".to_string(),
        )
    }

    #[tokio::test]
    async fn unknown_command_returns_error() {
        let handler = test_handler();
        let result = handler.execute_command(String::new(), vec![json!("bogus")]).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn serverstatus_reports_zero_players() {
        let handler = test_handler();
        let result = handler.execute_command("-".to_string(), vec![json!("serverstatus"), json!(0), json!(50)]).await;
        assert_eq!(result["player count"], 0);
    }

    #[tokio::test]
    async fn handle_request_rejects_unknown_method() {
        let handler = test_handler();
        let response = handler.handle_request(&json!({ "id": 1, "method": "bogus.method", "params": [] })).await;
        assert!(response.get("error").is_some());
    }
}
