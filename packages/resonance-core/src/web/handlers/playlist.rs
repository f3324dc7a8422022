//! `playlist play|add|insert|delete|clear|move|index|shuffle|repeat|tracks|
//! loadtracks|jump` — the command family that mutates a player's queue.

use serde_json::{json, Value};

use super::playback::start_current_track;
use super::{int_param, str_param, CommandContext};
use crate::player::PlayerIdentity;
use crate::playlist::{RepeatMode, ShuffleMode};

pub async fn cmd_playlist(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(subcommand) = str_param(params, 1) else {
        return json!({ "error": "playlist requires a subcommand" });
    };

    match subcommand.as_str() {
        "play" => playlist_play(ctx, params).await,
        "add" => playlist_add(ctx, params, None),
        "insert" => {
            let position = ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_index());
            playlist_add(ctx, params, Some(position))
        }
        "delete" => playlist_delete(ctx, params),
        "clear" => playlist_clear(ctx).await,
        "index" => playlist_index(ctx, params).await,
        "jump" => playlist_jump(ctx, params).await,
        "shuffle" => playlist_shuffle(ctx, params),
        "repeat" => playlist_repeat(ctx, params),
        "tracks" => json!({ "_tracks": ctx.playlists.with_playlist(&ctx.player_id, |p| p.len()) }),
        "loadtracks" => playlist_load_tracks(ctx, params).await,
        _ => json!({ "error": format!("unknown playlist subcommand: {subcommand}") }),
    }
}

async fn playlist_play(ctx: &CommandContext, params: &[Value]) -> Value {
    if let Some(path) = str_param(params, 2) {
        ctx.playlists.with_playlist(&ctx.player_id, |p| {
            p.clear();
            p.add_path(&path, None);
        });
    }
    start_and_report(ctx)
}

fn playlist_add(ctx: &CommandContext, params: &[Value], position: Option<usize>) -> Value {
    let Some(path) = str_param(params, 2) else {
        return json!({ "error": "playlist add/insert requires a path" });
    };
    let index = ctx.playlists.with_playlist(&ctx.player_id, |p| p.add_path(&path, position));
    json!({ "_index": index })
}

fn playlist_delete(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(index) = int_param(params, 2) else {
        return json!({ "error": "playlist delete requires an index" });
    };
    let removed = ctx.playlists.with_playlist(&ctx.player_id, |p| p.remove(index.max(0) as usize).is_some());
    json!({ "_removed": removed })
}

async fn playlist_clear(ctx: &CommandContext) -> Value {
    let count = ctx.playlists.with_playlist(&ctx.player_id, |p| p.clear());
    let identity = PlayerIdentity::from_str_lossy(&ctx.player_id);
    ctx.streaming.cancel_stream(&identity);
    if let Some(client) = ctx.registry.get(&identity) {
        client.stop();
    }
    json!({ "_cleared": count })
}

async fn playlist_index(ctx: &CommandContext, params: &[Value]) -> Value {
    let Some(raw) = str_param(params, 2) else {
        let index = ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_index());
        return json!({ "_index": index });
    };

    let moved = if raw == "+1" {
        ctx.playlists.with_playlist(&ctx.player_id, |p| p.next().is_some())
    } else if raw == "-1" {
        ctx.playlists.with_playlist(&ctx.player_id, |p| p.previous().is_some())
    } else {
        let target: usize = raw.parse().unwrap_or(0);
        ctx.playlists.with_playlist(&ctx.player_id, |p| p.play(target).is_some())
    };

    if moved {
        start_and_report(ctx)
    } else {
        json!({ "_index": ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_index()) })
    }
}

async fn playlist_jump(ctx: &CommandContext, params: &[Value]) -> Value {
    let target = int_param(params, 2).unwrap_or(0).max(0) as usize;
    ctx.playlists.with_playlist(&ctx.player_id, |p| p.play(target));
    start_and_report(ctx)
}

fn playlist_shuffle(ctx: &CommandContext, params: &[Value]) -> Value {
    let mode = match int_param(params, 2) {
        Some(1) => ShuffleMode::On,
        _ => ShuffleMode::Off,
    };
    ctx.playlists.with_playlist(&ctx.player_id, |p| p.set_shuffle(mode));
    json!({ "_shuffle": mode as i32 })
}

fn playlist_repeat(ctx: &CommandContext, params: &[Value]) -> Value {
    let mode = match int_param(params, 2) {
        Some(1) => RepeatMode::One,
        Some(2) => RepeatMode::All,
        _ => RepeatMode::Off,
    };
    ctx.playlists.with_playlist(&ctx.player_id, |p| p.set_repeat(mode));
    json!({ "_repeat": mode as i32 })
}

async fn playlist_load_tracks(ctx: &CommandContext, params: &[Value]) -> Value {
    let paths: Vec<String> = params.iter().skip(2).filter_map(|v| v.as_str().map(str::to_string)).collect();
    ctx.playlists.with_playlist(&ctx.player_id, |p| {
        p.clear();
        for path in &paths {
            p.add_path(path, None);
        }
    });
    start_and_report(ctx)
}

fn start_and_report(ctx: &CommandContext) -> Value {
    if let Some(client) = ctx.registry.get(&PlayerIdentity::from_str_lossy(&ctx.player_id)) {
        start_current_track(ctx, &client);
    }
    json!({ "_index": ctx.playlists.with_playlist(&ctx.player_id, |p| p.current_index()) })
}
