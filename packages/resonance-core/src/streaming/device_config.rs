//! Device-capability table.
//!
//! `TranscodePolicy` defers to this table for any format outside its two
//! hard-coded always/never lists. Authored as TOML; parsing that format is
//! out of scope here, but the runtime structure the parsed table lives in
//! is not — this is what the core consumes once some loader (a CLI flag, a
//! config file, an embedded default) has produced it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Broad generation of Slimproto hardware/software, used to bucket
/// per-device capability rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTier {
    Legacy,
    Modern,
    Future,
    Unknown,
}

/// Capability rules for one device tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub tier: DeviceTier,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub devices: Vec<String>,
    /// Formats this tier can decode directly. `"*"` means "everything not
    /// explicitly excluded by `transcode_required`".
    #[serde(default)]
    pub native_formats: Vec<String>,
    /// Formats that must be transcoded even if listed in `native_formats`.
    #[serde(default)]
    pub transcode_required: Vec<String>,
    #[serde(default)]
    pub streaming_protocols: Vec<String>,
}

impl DeviceCapabilities {
    #[must_use]
    pub fn can_decode_natively(&self, format: &str) -> bool {
        if self.transcode_required.iter().any(|f| f.eq_ignore_ascii_case(format)) {
            return false;
        }
        self.native_formats.iter().any(|f| f == "*" || f.eq_ignore_ascii_case(format))
    }
}

/// Full device-capability table, keyed by tier, plus the per-device-model
/// tier lookup built from each tier's `devices` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub modern: DeviceCapabilities,
    pub legacy: DeviceCapabilities,
    pub future: DeviceCapabilities,
    pub unknown_device_tier: DeviceTier,
    pub transcode_target: String,
    #[serde(default)]
    pub transcode_fallback: Option<String>,
    #[serde(skip)]
    device_tier_map: HashMap<String, DeviceTier>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut config = Self {
            modern: DeviceCapabilities {
                tier: DeviceTier::Modern,
                description: "Squeezebox2 and later".to_string(),
                devices: vec!["squeezebox2".to_string(), "transporter".to_string(), "receiver".to_string()],
                native_formats: vec!["mp3".to_string(), "flac".to_string(), "ogg".to_string(), "wav".to_string(), "aiff".to_string()],
                transcode_required: Vec::new(),
                streaming_protocols: vec!["http".to_string()],
            },
            legacy: DeviceCapabilities {
                tier: DeviceTier::Legacy,
                description: "Original Squeezebox / SliMP3".to_string(),
                devices: vec!["squeezebox".to_string(), "slimp3".to_string()],
                native_formats: vec!["mp3".to_string(), "wav".to_string()],
                transcode_required: vec!["flac".to_string(), "ogg".to_string()],
                streaming_protocols: vec!["http".to_string()],
            },
            future: DeviceCapabilities {
                tier: DeviceTier::Future,
                description: "Unreleased/experimental hardware".to_string(),
                devices: Vec::new(),
                native_formats: vec!["*".to_string()],
                transcode_required: Vec::new(),
                streaming_protocols: vec!["http".to_string()],
            },
            unknown_device_tier: DeviceTier::Legacy,
            transcode_target: "mp3".to_string(),
            transcode_fallback: None,
            device_tier_map: HashMap::new(),
        };
        config.rebuild_device_tier_map();
        config
    }
}

impl DeviceConfig {
    fn rebuild_device_tier_map(&mut self) {
        self.device_tier_map.clear();
        for caps in [&self.legacy, &self.modern, &self.future] {
            for device in &caps.devices {
                self.device_tier_map.insert(device.to_lowercase(), caps.tier);
            }
        }
    }

    /// Parses a device-capability table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or does not match the
    /// expected shape.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(text)?;
        config.rebuild_device_tier_map();
        Ok(config)
    }

    #[must_use]
    pub fn get_tier(&self, device_model: &str) -> DeviceTier {
        self.device_tier_map
            .get(&device_model.to_lowercase())
            .copied()
            .unwrap_or(self.unknown_device_tier)
    }

    #[must_use]
    pub fn get_capabilities(&self, tier: DeviceTier) -> &DeviceCapabilities {
        match tier {
            DeviceTier::Legacy => &self.legacy,
            DeviceTier::Modern => &self.modern,
            DeviceTier::Future => &self.future,
            DeviceTier::Unknown => &self.legacy,
        }
    }

    #[must_use]
    pub fn can_decode_natively(&self, device_model: &str, format: &str) -> bool {
        let tier = self.get_tier(device_model);
        self.get_capabilities(tier).can_decode_natively(format)
    }

    /// Fallback path `TranscodePolicy` defers to for formats outside its
    /// hard-coded always/never lists: true unless every tier would accept
    /// the format natively (conservative — matches the original's "unknown
    /// formats get transcoded for safety" stance).
    #[must_use]
    pub fn needs_transcoding(&self, format: &str) -> bool {
        !self.modern.can_decode_natively(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resolves_legacy_devices() {
        let config = DeviceConfig::default();
        assert_eq!(config.get_tier("squeezebox"), DeviceTier::Legacy);
    }

    #[test]
    fn unknown_device_falls_back_to_configured_tier() {
        let config = DeviceConfig::default();
        assert_eq!(config.get_tier("some_future_gadget"), DeviceTier::Legacy);
    }

    #[test]
    fn legacy_tier_requires_transcode_for_flac() {
        let config = DeviceConfig::default();
        assert!(!config.can_decode_natively("squeezebox", "flac"));
    }

    #[test]
    fn wildcard_native_format_accepts_anything() {
        let caps = DeviceCapabilities {
            tier: DeviceTier::Future,
            description: String::new(),
            devices: Vec::new(),
            native_formats: vec!["*".to_string()],
            transcode_required: vec!["aac".to_string()],
            streaming_protocols: Vec::new(),
        };
        assert!(caps.can_decode_natively("flac"));
        assert!(!caps.can_decode_natively("aac"));
    }

    #[test]
    fn from_toml_parses_minimal_table() {
        let text = r#"
            unknown_device_tier = "legacy"
            transcode_target = "mp3"

            [modern]
            tier = "modern"
            native_formats = ["mp3", "flac"]

            [legacy]
            tier = "legacy"
            devices = ["squeezebox"]
            native_formats = ["mp3"]

            [future]
            tier = "future"
            native_formats = ["*"]
        "#;
        let config = DeviceConfig::from_toml(text).unwrap();
        assert_eq!(config.get_tier("squeezebox"), DeviceTier::Legacy);
    }
}
