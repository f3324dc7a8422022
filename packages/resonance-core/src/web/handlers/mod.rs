//! JSON-RPC command handlers, one module per LMS command family.
//!
//! Every handler has the shape `fn(&CommandContext, &[Value]) -> Value`
//! (async). [`crate::web::jsonrpc`] owns the dispatch table; this module
//! tree only holds the command bodies, kept thin per handler the way the
//! command surface they're modeled on splits them.

pub mod library;
pub mod menu;
pub mod playback;
pub mod playlist;
pub mod seeking;
pub mod status;

use std::sync::Arc;

use crate::library::Library;
use crate::player::PlayerRegistry;
use crate::playlist::PlaylistManager;
use crate::streaming::{DeviceConfig, SeekCoordinator, SeekExecutor, StreamingCoordinator, TranscodePolicy};

/// Everything a command handler needs to do its job, built fresh per
/// dispatched request.
pub struct CommandContext {
    pub player_id: String,
    pub registry: Arc<PlayerRegistry>,
    pub playlists: Arc<PlaylistManager>,
    pub library: Arc<dyn Library>,
    pub streaming: Arc<StreamingCoordinator>,
    pub seek: Arc<SeekCoordinator>,
    pub seek_executor: Arc<dyn SeekExecutor>,
    pub device_config: Arc<DeviceConfig>,
    pub transcode_policy: Arc<TranscodePolicy>,
    pub server_host: String,
    pub server_port: u16,
    pub server_uuid: String,
}

impl CommandContext {
    /// Builds the `http://host:port/stream.mp3?player=<mac>` URL a player
    /// should fetch to resume streaming.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("http://{}:{}/stream.mp3?player={}", self.server_host, self.server_port, self.player_id)
    }
}

/// Reads a positional string parameter (LMS commands accept both
/// `tag:value` strings and bare positional args; this returns the latter).
#[must_use]
pub fn str_param(params: &[serde_json::Value], index: usize) -> Option<String> {
    params.get(index).and_then(|v| v.as_str()).map(str::to_string)
}

/// Reads a positional integer parameter.
#[must_use]
pub fn int_param(params: &[serde_json::Value], index: usize) -> Option<i64> {
    params.get(index).and_then(serde_json::Value::as_i64)
}

/// Parses a `tag:value` parameter anywhere in the params array (order
/// after the command name is not guaranteed).
#[must_use]
pub fn tag_param<'a>(params: &'a [serde_json::Value], tag: &str) -> Option<&'a str> {
    let prefix = format!("{tag}:");
    params.iter().filter_map(|v| v.as_str()).find_map(|s| s.strip_prefix(prefix.as_str()))
}
