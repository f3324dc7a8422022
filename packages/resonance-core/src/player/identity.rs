//! Player identity and static device info.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A player's Slimproto MAC address, the stable key used everywhere a player
/// is referenced: `PlayerRegistry`, the streaming/seek coordinators, Cometd
/// subscriptions, and JSON-RPC's `player_id` parameter.
///
/// Normalized to lowercase `aa:bb:cc:dd:ee:ff` on construction so callers
/// never have to worry about case mismatches between what a device sent in
/// its `HELO` frame and what a control app typed into a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIdentity(String);

impl PlayerIdentity {
    /// Builds an identity from 6 raw MAC bytes, as found in a `HELO` frame.
    #[must_use]
    pub fn from_mac_bytes(bytes: [u8; 6]) -> Self {
        Self(
            bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":"),
        )
    }

    /// Builds an identity from a `aa:bb:cc:dd:ee:ff`-style string, normalizing case.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        Self(s.to_lowercase())
    }

    /// Returns the canonical `aa:bb:cc:dd:ee:ff` string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerIdentity {
    fn from(s: &str) -> Self {
        Self::from_str_lossy(s)
    }
}

impl From<String> for PlayerIdentity {
    fn from(s: String) -> Self {
        Self::from_str_lossy(&s)
    }
}

/// Device model class reported in a `HELO` frame's device-ID byte.
///
/// Only a handful of values are in active use; anything else is preserved
/// as `Unknown` so the server can still serve a device it doesn't
/// specifically recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Squeezebox,
    SoftSqueeze,
    Squeezebox2,
    Transporter,
    SoftSqueeze3,
    Receiver,
    Squeezeplay,
    Http,
    Unknown(u8),
}

impl DeviceType {
    /// Maps the raw `HELO` device-ID byte to a [`DeviceType`].
    #[must_use]
    pub fn from_byte(id: u8) -> Self {
        match id {
            2 => Self::Squeezebox,
            3 => Self::SoftSqueeze,
            4 => Self::Squeezebox2,
            5 => Self::Transporter,
            6 => Self::SoftSqueeze3,
            7 => Self::Receiver,
            8 => Self::Squeezeplay,
            10 => Self::Http,
            other => Self::Unknown(other),
        }
    }
}

/// Static info about a connected player, set once at `HELO` time and
/// updated only when the device reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub identity: PlayerIdentity,
    /// Friendly name, defaults to the MAC if the device never reports one.
    pub name: String,
    pub device_type: DeviceType,
    pub firmware_rev: u8,
    /// Raw capability tokens reported at the end of `HELO` (e.g. `"Ogg,Flc,Pcm,Mp3"`).
    pub capabilities: Vec<String>,
    /// Remote IP the player connected from.
    pub remote_addr: String,
}

impl PlayerInfo {
    #[must_use]
    pub fn supports_format(&self, format_tag: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(format_tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_bytes_format_lowercase_colon_separated() {
        let id = PlayerIdentity::from_mac_bytes([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(id.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn from_str_lossy_normalizes_case() {
        let id = PlayerIdentity::from_str_lossy("AA:BB:CC:DD:EE:FF");
        assert_eq!(id.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn unknown_device_type_preserves_byte() {
        assert_eq!(DeviceType::from_byte(99), DeviceType::Unknown(99));
    }
}
