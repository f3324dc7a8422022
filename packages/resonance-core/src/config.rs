//! Core server configuration.
//!
//! All fields have sensible defaults so a bare [`Config::default`] is
//! enough to run. `apps/server` layers YAML + environment overrides on
//! top of this before passing it to [`crate::bootstrap::bootstrap_services`].

use serde::{Deserialize, Serialize};

/// Streaming/transcoding tunables grouped separately since they come from
/// a different part of a deployment's config (device profiles, transcode
/// table path) than the network-facing settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamingConfig {
    /// Path to a `legacy.conf`-style transcode rule table. `None` uses the
    /// built-in [`crate::streaming::TranscodePolicy`] always/never lists
    /// with no device-specific overrides.
    pub transcode_rules_path: Option<String>,

    /// Path to a TOML device-capability table. `None` uses
    /// [`crate::streaming::DeviceConfig::default`].
    pub device_config_path: Option<String>,

    /// Directory searched for bundled transcoder binaries before falling
    /// back to `PATH`.
    pub third_party_bin_dir: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            transcode_rules_path: None,
            device_config_path: None,
            third_party_bin_dir: "third_party/bin".to_string(),
        }
    }
}

/// Configuration for the Resonance server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Network
    /// Port for Slimproto TCP connections (0 = auto-allocate; players
    /// normally expect the standard port, so this is rarely anything but
    /// the default).
    pub slimproto_port: u16,

    /// Port for the HTTP server (status page, `/stream.mp3`, JSON-RPC,
    /// CometD).
    pub http_port: u16,

    /// Enable the legacy UDP discovery responder (`d`/`e`/`h` probes).
    pub discovery_enabled: bool,

    // Streaming
    #[serde(default)]
    pub streaming: StreamingConfig,

    // CometD / JSON-RPC long-poll
    /// How long a `/cometd` long-poll connection may block waiting for
    /// events before returning an empty response (seconds).
    pub cometd_connect_timeout_secs: u64,

    /// Interval between CometD heartbeat checks (seconds).
    pub cometd_heartbeat_interval_secs: u64,

    /// How long an idle CometD session is kept before being dropped
    /// (seconds).
    pub cometd_session_timeout_secs: u64,

    /// Capacity of the internal event channel bridging `EventBus`
    /// publishes to long-polling CometD clients.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slimproto_port: crate::protocol_constants::SLIMPROTO_PORT,
            http_port: crate::protocol_constants::DEFAULT_HTTP_PORT,
            discovery_enabled: true,
            streaming: StreamingConfig::default(),
            cometd_connect_timeout_secs: crate::protocol_constants::COMETD_CONNECT_TIMEOUT_MS / 1000,
            cometd_heartbeat_interval_secs: crate::protocol_constants::COMETD_HEARTBEAT_SECS,
            cometd_session_timeout_secs: crate::protocol_constants::COMETD_SESSION_TIMEOUT_SECS,
            event_channel_capacity: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_standard_slimproto_port() {
        assert_eq!(Config::default().slimproto_port, 3483);
    }
}
