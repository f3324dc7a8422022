//! Jive menu-system commands, used by hardware with an on-device UI
//! (Squeezebox Controller, Touch, Boom, Radio) to build their home menu
//! without a control app in the loop. Kept minimal: enough structure for
//! those devices to render a menu, not a full port of LMS's plugin-driven
//! menu tree.

use serde_json::{json, Value};

use super::{int_param, str_param, CommandContext};

pub async fn cmd_menu(ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({
        "item_loop": [
            { "text": "Now Playing", "actions": { "go": { "cmd": ["status"] } } },
            { "text": "My Music", "actions": { "go": { "cmd": ["browselibrary", "items"] } } },
            { "text": "Settings", "actions": { "go": { "cmd": ["playerinfo"] } } },
        ],
        "offset": 0,
        "count": 3,
        "player_name": ctx.player_id,
    })
}

pub async fn cmd_menustatus(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "_menustatus": 1 })
}

pub async fn cmd_browselibrary(ctx: &CommandContext, params: &[Value]) -> Value {
    let subcommand = str_param(params, 1).unwrap_or_default();
    if subcommand != "items" {
        return json!({ "error": format!("unknown browselibrary subcommand: {subcommand}") });
    }

    let browse = crate::library::BrowseParams {
        start: int_param(params, 2).unwrap_or(0).max(0) as usize,
        count: int_param(params, 3).unwrap_or(50).max(0) as usize,
        ..Default::default()
    };
    let artists = ctx.library.artists(&browse).await;

    json!({
        "item_loop": artists.items.into_iter().map(|a| json!({ "text": a.get("artist").cloned().unwrap_or(Value::Null) })).collect::<Vec<_>>(),
        "count": artists.total,
        "offset": browse.start,
    })
}

pub async fn cmd_playlistcontrol(ctx: &CommandContext, params: &[Value]) -> Value {
    super::playlist::cmd_playlist(ctx, params).await
}

pub async fn cmd_date(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "date_epoch": crate::utils::now_millis() / 1000 })
}

pub async fn cmd_alarm_settings(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "alarms_loop": [] })
}

pub async fn cmd_sleep_settings(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "will_sleep_in": 0 })
}

pub async fn cmd_sync_settings(ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "sync_member": ctx.player_id, "sync_members": [] })
}

pub async fn cmd_firmwareupgrade(_ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "firmwareUpgrade": 0 })
}

pub async fn cmd_playerinfo(ctx: &CommandContext, _params: &[Value]) -> Value {
    let identity = crate::player::PlayerIdentity::from_str_lossy(&ctx.player_id);
    match ctx.registry.get(&identity) {
        Some(client) => {
            let info = client.info();
            json!({
                "playerid": info.identity.as_str(),
                "name": info.name,
                "model": format!("{:?}", info.device_type),
            })
        }
        None => json!({ "error": "player not found" }),
    }
}
