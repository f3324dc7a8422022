//! Registry of connected players.

use std::sync::Arc;

use dashmap::DashMap;

use super::client::PlayerClient;
use super::identity::PlayerIdentity;

/// Concurrent map of connected players, keyed by MAC.
///
/// Every component that needs to reach a player by id — the JSON-RPC
/// dispatcher, the HTTP stream route, Cometd's `slim.request` auto-create
/// path — goes through this registry rather than holding its own copy of
/// the player list.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<PlayerIdentity, Arc<PlayerClient>>,
}

impl PlayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected player, replacing any prior connection
    /// under the same identity (a reconnect from the same device).
    pub fn register(&self, client: Arc<PlayerClient>) {
        self.players.insert(client.identity().clone(), client);
    }

    /// Removes a player, e.g. on socket close.
    pub fn remove(&self, identity: &PlayerIdentity) -> Option<Arc<PlayerClient>> {
        self.players.remove(identity).map(|(_, v)| v)
    }

    /// Looks up a player by identity.
    #[must_use]
    pub fn get(&self, identity: &PlayerIdentity) -> Option<Arc<PlayerClient>> {
        self.players.get(identity).map(|entry| entry.value().clone())
    }

    /// Returns true if a player with this identity is currently connected.
    #[must_use]
    pub fn contains(&self, identity: &PlayerIdentity) -> bool {
        self.players.contains_key(identity)
    }

    /// Returns every connected player, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<PlayerClient>> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of connected players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::identity::PlayerInfo;

    fn test_client(mac: &str) -> Arc<PlayerClient> {
        let identity = PlayerIdentity::from_str_lossy(mac);
        let info = PlayerInfo {
            identity: identity.clone(),
            name: mac.to_string(),
            device_type: super::super::identity::DeviceType::Squeezebox2,
            firmware_rev: 1,
            capabilities: vec!["Mp3".to_string()],
            remote_addr: "127.0.0.1".to_string(),
        };
        Arc::new(PlayerClient::new(info))
    }

    #[test]
    fn register_then_get_roundtrips() {
        let registry = PlayerRegistry::new();
        let client = test_client("aa:bb:cc:dd:ee:ff");
        registry.register(client.clone());

        let found = registry.get(&PlayerIdentity::from_str_lossy("AA:BB:CC:DD:EE:FF"));
        assert!(found.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_drops_player() {
        let registry = PlayerRegistry::new();
        let identity = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");
        registry.register(test_client("aa:bb:cc:dd:ee:ff"));
        assert!(registry.remove(&identity).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn reconnect_replaces_prior_client() {
        let registry = PlayerRegistry::new();
        registry.register(test_client("aa:bb:cc:dd:ee:ff"));
        registry.register(test_client("aa:bb:cc:dd:ee:ff"));
        assert_eq!(registry.len(), 1);
    }
}
