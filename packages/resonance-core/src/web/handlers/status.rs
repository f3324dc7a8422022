//! `serverstatus`, `players`, `player`, `status`, `pref`, `rescan`,
//! `wipecache` — the commands a control app polls or subscribes to for
//! its main "now playing" view.

use serde_json::{json, Value};

use super::{int_param, str_param, CommandContext};
use crate::player::PlayerClient;
use crate::protocol_constants::{APP_NAME, SERVER_VERSION};

fn player_summary(client: &std::sync::Arc<PlayerClient>) -> Value {
    let info = client.info();
    let status = client.status();
    json!({
        "playerid": info.identity.as_str(),
        "name": info.name,
        "model": format!("{:?}", info.device_type),
        "power": 1,
        "connected": 1,
        "isplaying": matches!(status.state, crate::player::PlayerState::Playing) as i32,
        "ip": info.remote_addr,
    })
}

pub async fn cmd_serverstatus(ctx: &CommandContext, params: &[Value]) -> Value {
    let players = ctx.registry.all();
    let start = int_param(params, 1).unwrap_or(0).max(0) as usize;
    let count = int_param(params, 2).unwrap_or(players.len() as i64).max(0) as usize;

    let players_loop: Vec<Value> = players.iter().skip(start).take(count.max(1)).map(player_summary).collect();

    json!({
        "version": SERVER_VERSION,
        "server_name": APP_NAME,
        "uuid": ctx.server_uuid,
        "info total albums": ctx.library.total_albums().await,
        "info total artists": ctx.library.total_artists().await,
        "info total songs": ctx.library.total_tracks().await,
        "player count": players.len(),
        "players_loop": players_loop,
    })
}

pub async fn cmd_players(ctx: &CommandContext, _params: &[Value]) -> Value {
    let players = ctx.registry.all();
    json!({
        "count": players.len(),
        "players_loop": players.iter().map(player_summary).collect::<Vec<_>>(),
    })
}

pub async fn cmd_player(ctx: &CommandContext, params: &[Value]) -> Value {
    let subcommand = str_param(params, 1).unwrap_or_default();
    let Some(client) = ctx.registry.get(&crate::player::PlayerIdentity::from_str_lossy(&ctx.player_id)) else {
        return json!({ "error": "player not found" });
    };
    match subcommand.as_str() {
        "count" => json!({ "_count": ctx.registry.len() }),
        "name" | "ip" | "model" => player_summary(&client),
        _ => player_summary(&client),
    }
}

pub async fn cmd_status(ctx: &CommandContext, params: &[Value]) -> Value {
    let identity = crate::player::PlayerIdentity::from_str_lossy(&ctx.player_id);
    let Some(client) = ctx.registry.get(&identity) else {
        return json!({ "error": "player not found" });
    };
    let status = client.status();
    let mode = match status.state {
        crate::player::PlayerState::Playing | crate::player::PlayerState::Buffering => "play",
        crate::player::PlayerState::Paused => "pause",
        _ => "stop",
    };

    let playlist_loop = ctx.playlists.with_playlist(&ctx.player_id, |p| p.tracks_info());

    json!({
        "mode": mode,
        "time": status.elapsed_milliseconds as f64 / 1000.0,
        "duration": status.duration_seconds,
        "mixer volume": status.volume,
        "playlist_cur_index": status.playlist_index,
        "playlist_tracks": status.playlist_tracks,
        "playlist shuffle": ctx.playlists.with_playlist(&ctx.player_id, |p| p.shuffle_mode() as i32),
        "playlist repeat": ctx.playlists.with_playlist(&ctx.player_id, |p| p.repeat_mode() as i32),
        "playlist_loop": playlist_loop,
    })
}

pub async fn cmd_pref(_ctx: &CommandContext, params: &[Value]) -> Value {
    let name = str_param(params, 1).unwrap_or_default();
    json!({ "pref": name, "value": Value::Null })
}

pub async fn cmd_rescan(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "rescan": 0 })
}

pub async fn cmd_wipecache(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "wipecache": 1 })
}
