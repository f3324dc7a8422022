//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host/interface to bind the HTTP and Slimproto listeners to.
    /// Override: `RESONANCE_HOST`
    pub host: String,

    /// Port for Slimproto TCP connections.
    /// Override: `RESONANCE_SLIMPROTO_PORT`
    pub slimproto_port: u16,

    /// Port for the HTTP server (stream, JSON-RPC, CometD).
    /// Override: `RESONANCE_WEB_PORT`
    pub web_port: u16,

    /// Enable the legacy UDP discovery responder.
    pub discovery_enabled: bool,

    /// Path to a `legacy.conf`-style transcode rule table.
    /// Override: `RESONANCE_TRANSCODE_RULES`
    pub transcode_rules_path: Option<PathBuf>,

    /// Path to a TOML device-capability table.
    /// Override: `RESONANCE_DEVICE_CONFIG`
    pub device_config_path: Option<PathBuf>,

    /// Directory searched for bundled transcoder binaries before PATH.
    pub third_party_bin_dir: PathBuf,

    /// Data directory for persistent state.
    /// Override: `RESONANCE_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            slimproto_port: resonance_core::protocol_constants::SLIMPROTO_PORT,
            web_port: resonance_core::protocol_constants::DEFAULT_HTTP_PORT,
            discovery_enabled: true,
            transcode_rules_path: None,
            device_config_path: None,
            third_party_bin_dir: PathBuf::from("third_party/bin"),
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RESONANCE_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("RESONANCE_SLIMPROTO_PORT") {
            if let Ok(port) = val.parse() {
                self.slimproto_port = port;
            }
        }

        if let Ok(val) = std::env::var("RESONANCE_WEB_PORT") {
            if let Ok(port) = val.parse() {
                self.web_port = port;
            }
        }

        if let Ok(val) = std::env::var("RESONANCE_TRANSCODE_RULES") {
            self.transcode_rules_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("RESONANCE_DEVICE_CONFIG") {
            self.device_config_path = Some(PathBuf::from(val));
        }

        // RESONANCE_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs.
    }

    /// Converts to resonance-core's `Config` type.
    pub fn to_core_config(&self) -> resonance_core::Config {
        resonance_core::Config {
            slimproto_port: self.slimproto_port,
            http_port: self.web_port,
            discovery_enabled: self.discovery_enabled,
            streaming: resonance_core::config::StreamingConfig {
                transcode_rules_path: self.transcode_rules_path.as_ref().map(|p| p.display().to_string()),
                device_config_path: self.device_config_path.as_ref().map(|p| p.display().to_string()),
                third_party_bin_dir: self.third_party_bin_dir.display().to_string(),
            },
            ..Default::default()
        }
    }
}
