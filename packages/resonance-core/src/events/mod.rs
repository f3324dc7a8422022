//! Event bus for decoupled communication between components.
//!
//! The primary consumer is the Cometd surface: it subscribes to `player.*`
//! and fans state changes out to whichever control apps are long-polling or
//! streaming at the time. [`EventBus`] supports exact-channel subscriptions,
//! a one-level-prefix wildcard (`"player.*"` matches `"player.status"` but
//! not `"library.scan"`), and the global wildcard `"*"`.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

/// Domain events published on the bus.
///
/// Each variant corresponds to one channel string, returned by
/// [`Event::channel`]. The shape mirrors what the Cometd surface forwards
/// to subscribed control apps, so the `Serialize` impl is also what ends up
/// on the wire inside a Bayeux `data` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A player completed its Slimproto handshake.
    PlayerConnected {
        player_id: String,
        name: String,
        model: String,
    },
    /// A player's TCP connection dropped.
    PlayerDisconnected { player_id: String },
    /// Player transport/volume/position state changed.
    PlayerStatus {
        player_id: String,
        state: String,
        volume: u8,
        muted: bool,
        elapsed_seconds: f64,
        elapsed_milliseconds: u64,
        duration: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_track: Option<Value>,
        playlist_index: usize,
        playlist_tracks: usize,
    },
    /// A track finished playing on a player.
    ///
    /// `stream_generation` ties this event back to the stream slot that was
    /// active when the track ended. Consumers must only treat this as a cue
    /// to auto-advance the playlist when the generation still matches the
    /// player's current stream — a late-arriving `STMu` for a track the
    /// player has already been told to abandon must not advance anything.
    PlayerTrackFinished {
        player_id: String,
        stream_generation: Option<u64>,
    },
    /// Playlist contents or cursor changed.
    PlayerPlaylist {
        player_id: String,
        action: String,
        index: usize,
        count: usize,
    },
    /// Library scan progress.
    LibraryScan {
        status: String,
        scanned: usize,
        total: usize,
        #[serde(skip_serializing_if = "String::is_empty")]
        current_path: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        error: String,
    },
}

impl Event {
    /// Returns the channel string this event is published on.
    #[must_use]
    pub fn channel(&self) -> &'static str {
        match self {
            Self::PlayerConnected { .. } => "player.connected",
            Self::PlayerDisconnected { .. } => "player.disconnected",
            Self::PlayerStatus { .. } => "player.status",
            Self::PlayerTrackFinished { .. } => "player.track_finished",
            Self::PlayerPlaylist { .. } => "player.playlist",
            Self::LibraryScan { .. } => "library.scan",
        }
    }
}

/// Async handler invoked when a subscribed event is published.
///
/// Handlers do not return a `Result`: a handler that needs to report
/// failure logs it itself. This keeps one subscriber's trouble from
/// affecting delivery to the others, matching the bus's error-isolation
/// guarantee.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Simple async pub/sub event bus.
///
/// Supports multiple handlers per channel, a one-level wildcard suffix
/// (`"player.*"`), and the global wildcard `"*"`. Handlers run sequentially
/// outside of any internal lock, so a slow or misbehaving handler delays
/// delivery to later handlers but never blocks `subscribe`/`unsubscribe`
/// on other channels.
#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Creates an empty event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `pattern`.
    ///
    /// `pattern` is either an exact channel (`"player.status"`), a
    /// one-level wildcard (`"player.*"`), or `"*"` for every channel.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(pattern.into()).or_default().push(handler);
    }

    /// Publishes `event` to every handler whose pattern matches its channel.
    ///
    /// Returns the number of handlers invoked.
    pub async fn publish(&self, event: Event) -> usize {
        let channel = event.channel();
        let mut matching: Vec<Arc<dyn EventHandler>> = Vec::new();

        for entry in self.handlers.iter() {
            let pattern = entry.key().as_str();
            let hit = if pattern == channel {
                true
            } else if pattern == "*" {
                true
            } else if let Some(prefix) = pattern.strip_suffix(".*") {
                channel.starts_with(prefix) && channel[prefix.len()..].starts_with('.')
            } else {
                false
            };
            if hit {
                matching.extend(entry.value().iter().cloned());
            }
        }

        for handler in &matching {
            handler.handle(&event).await;
        }

        if !matching.is_empty() {
            log::debug!("[EventBus] published {} to {} handlers", channel, matching.len());
        }

        matching.len()
    }

    /// Removes every subscription.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn exact_channel_match_delivers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("player.status", Arc::new(CountingHandler(count.clone())));

        let delivered = bus
            .publish(Event::PlayerStatus {
                player_id: "aa:bb:cc:dd:ee:ff".into(),
                state: "playing".into(),
                volume: 80,
                muted: false,
                elapsed_seconds: 1.0,
                elapsed_milliseconds: 1000,
                duration: 200.0,
                current_track: None,
                playlist_index: 0,
                playlist_tracks: 1,
            })
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prefix_wildcard_matches_sibling_channels() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("player.*", Arc::new(CountingHandler(count.clone())));

        bus.publish(Event::PlayerConnected {
            player_id: "aa:bb:cc:dd:ee:ff".into(),
            name: "Kitchen".into(),
            model: "squeezebox".into(),
        })
        .await;
        bus.publish(Event::PlayerDisconnected {
            player_id: "aa:bb:cc:dd:ee:ff".into(),
        })
        .await;
        bus.publish(Event::LibraryScan {
            status: "started".into(),
            scanned: 0,
            total: 0,
            current_path: String::new(),
            error: String::new(),
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn global_wildcard_matches_everything() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("*", Arc::new(CountingHandler(count.clone())));

        bus.publish(Event::LibraryScan {
            status: "completed".into(),
            scanned: 10,
            total: 10,
            current_path: String::new(),
            error: String::new(),
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_removes_all_subscriptions() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("*", Arc::new(CountingHandler(count.clone())));
        bus.clear();

        bus.publish(Event::PlayerDisconnected {
            player_id: "aa:bb:cc:dd:ee:ff".into(),
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
