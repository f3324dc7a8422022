//! Event emitter abstraction for decoupling services from the event bus.
//!
//! Services that only need to emit, never subscribe, depend on this trait
//! rather than `Arc<EventBus>` directly, which keeps them testable without
//! spinning up a bus.

use super::Event;

/// Trait for emitting domain events without depending on [`super::EventBus`] directly.
pub trait EventEmitter: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: Event);
}

/// No-op emitter for tests that don't care about event delivery.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: Event) {}
}

/// Logging emitter that records every event at debug level via `tracing`.
///
/// Kept on `tracing` rather than `log` so a binary that wants structured
/// spans around event flow can layer a subscriber on top; everything else
/// in the crate logs through plain `log`.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: Event) {
        tracing::debug!(channel = event.channel(), ?event, "event_emitted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _event: Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            count: AtomicUsize::new(0),
        });

        emitter.emit(Event::PlayerDisconnected {
            player_id: "aa:bb:cc:dd:ee:ff".into(),
        });
        emitter.emit(Event::PlayerDisconnected {
            player_id: "aa:bb:cc:dd:ee:ff".into(),
        });

        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }
}
