//! `play`, `pause`, `stop`, `mode`, `power`, `mixer`, `button` — transport
//! control commands.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use super::{int_param, str_param, CommandContext};
use crate::player::{PlayerClient, PlayerIdentity};

fn current_client(ctx: &CommandContext) -> Option<Arc<PlayerClient>> {
    ctx.registry.get(&PlayerIdentity::from_str_lossy(&ctx.player_id))
}

/// Queues the playlist's current track on the `StreamingCoordinator` and
/// tells the player to start fetching it. Shared by `play`, `playlist
/// index +1/-1`, and track-finished auto-advance — anywhere a new track
/// needs to actually start playing rather than just update the `Playlist`
/// cursor.
pub(crate) fn start_current_track(ctx: &CommandContext, client: &PlayerClient) -> bool {
    let Some(path) = ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_track().map(|t| t.path.clone())) else {
        return false;
    };

    let source_format = Path::new(&path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let needs_transcode = ctx.transcode_policy.needs_transcoding(&source_format, &ctx.device_config);
    let effective_format = if needs_transcode {
        crate::streaming::policy::TRANSCODE_TARGET_FORMAT
    } else {
        source_format.as_str()
    };

    let identity = PlayerIdentity::from_str_lossy(&ctx.player_id);
    let token = ctx.streaming.queue_file(&identity, std::path::PathBuf::from(&path));
    client.update_status(|s| s.begin_track(token.generation()));

    let http_request = format!("GET {} HTTP/1.0\r\n\r\n", ctx.stream_url_path());
    let format_hint = ctx.transcode_policy.strm_expected_format_hint(effective_format);
    client.start_track(http_request, format_hint, b'1')
}

impl CommandContext {
    fn stream_url_path(&self) -> String {
        format!("/stream.mp3?player={}", self.player_id)
    }
}

pub async fn cmd_play(ctx: &CommandContext, _params: &[Value]) -> Value {
    let Some(client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };

    let is_stopped = matches!(client.status().state, crate::player::PlayerState::Stopped | crate::player::PlayerState::Disconnected);
    let has_tracks = ctx.playlists.with_playlist(&ctx.player_id, |p| !p.is_empty());

    if is_stopped && has_tracks {
        let index = ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_index());
        ctx.playlists.with_playlist(&ctx.player_id, |p| p.play(index).map(|_| ()));
        start_current_track(ctx, &client);
    } else {
        client.unpause();
    }
    json!({})
}

pub async fn cmd_pause(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };
    match int_param(params, 1) {
        Some(0) => {
            client.unpause();
        }
        _ => {
            client.pause();
        }
    }
    json!({})
}

pub async fn cmd_stop(ctx: &CommandContext, _params: &[Value]) -> Value {
    let Some(client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };
    client.stop();
    ctx.streaming.cancel_stream(&PlayerIdentity::from_str_lossy(&ctx.player_id));
    json!({})
}

pub async fn cmd_mode(ctx: &CommandContext, _params: &[Value]) -> Value {
    let Some(client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };
    let mode = match client.status().state {
        crate::player::PlayerState::Playing | crate::player::PlayerState::Buffering => "play",
        crate::player::PlayerState::Paused => "pause",
        _ => "stop",
    };
    json!({ "_mode": mode })
}

pub async fn cmd_power(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(_client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };
    let power = int_param(params, 1).unwrap_or(1);
    json!({ "_power": power })
}

pub async fn cmd_mixer(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(client) = current_client(ctx) else {
        return json!({ "error": "player not found" });
    };
    let subcommand = str_param(params, 1).unwrap_or_default();
    let raw = str_param(params, 2).unwrap_or_default();

    match subcommand.as_str() {
        "volume" => {
            let current = client.status().volume;
            let new_volume = parse_relative(&raw, current);
            client.set_volume(new_volume);
            json!({ "_volume": new_volume })
        }
        "muting" => {
            let muted = raw != "0";
            client.update_status(|s| s.muted = muted);
            json!({ "_muting": muted as i32 })
        }
        _ => json!({ "error": format!("unknown mixer subcommand: {subcommand}") }),
    }
}

fn parse_relative(raw: &str, current: u8) -> u8 {
    if let Some(delta) = raw.strip_prefix('+') {
        return current.saturating_add(delta.parse().unwrap_or(0)).min(100);
    }
    if let Some(delta) = raw.strip_prefix('-') {
        return current.saturating_sub(delta.parse().unwrap_or(0));
    }
    raw.parse().unwrap_or(current).min(100)
}

pub async fn cmd_button(_ctx: &CommandContext, params: &[Value]) -> Value {
    let button = str_param(params, 1).unwrap_or_default();
    json!({ "_button": button })
}
