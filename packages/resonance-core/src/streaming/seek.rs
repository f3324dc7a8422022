//! Seek coordination: collapses rapid scrub events into a single execution.
//!
//! A control app dragging a seek slider can fire a dozen seek requests in a
//! second. Executing each one would mean tearing down and restarting a
//! transcoder subprocess a dozen times for a position the user only cared
//! about once they let go. This coordinator debounces: each request bumps
//! a per-player generation counter and replaces whatever seek position was
//! pending; after a short coalesce window, only the request that is still
//! the latest one actually runs.
//!
//! Execution itself is further guarded by a per-player lock with a bounded
//! acquire timeout — if a previous seek's stop/flush/restart cycle hasn't
//! finished yet, a timed-out acquire is treated as ordinary backpressure,
//! not a failure to report up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::player::PlayerIdentity;
use crate::protocol_constants::{SEEK_COALESCE_DELAY_MS, SEEK_LOCK_TIMEOUT_MS};

/// Performs the actual work of seeking a player to a position: stopping the
/// current stream, repositioning, and restarting it. Implemented by
/// whatever owns the transcoder/stream lifecycle (kept generic here so the
/// coordinator has no dependency on `streaming::transcoder` or the HTTP
/// layer).
#[async_trait]
pub trait SeekExecutor: Send + Sync {
    async fn execute_seek(&self, player: &PlayerIdentity, seconds: f64);
}

struct PlayerSeekState {
    generation: AtomicU64,
    pending: parking_lot::Mutex<Option<(u64, f64)>>,
    execution_lock: Mutex<()>,
}

impl Default for PlayerSeekState {
    fn default() -> Self {
        Self {
            generation: AtomicU64::new(0),
            pending: parking_lot::Mutex::new(None),
            execution_lock: Mutex::new(()),
        }
    }
}

/// Debounces and serializes seek execution per player.
#[derive(Default)]
pub struct SeekCoordinator {
    players: DashMap<PlayerIdentity, Arc<PlayerSeekState>>,
}

impl SeekCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, player: &PlayerIdentity) -> Arc<PlayerSeekState> {
        self.players.entry(player.clone()).or_default().clone()
    }

    /// Requests a seek to `seconds`. Returns once either this request (or a
    /// later one that superseded it) has run, or the player's execution
    /// lock timed out.
    pub async fn request_seek(
        &self,
        player: &PlayerIdentity,
        seconds: f64,
        executor: &dyn SeekExecutor,
    ) {
        let state = self.state_for(player);
        let my_generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *state.pending.lock() = Some((my_generation, seconds));

        tokio::time::sleep(Duration::from_millis(SEEK_COALESCE_DELAY_MS)).await;

        if state.generation.load(Ordering::SeqCst) != my_generation {
            log::debug!("[Seek] {player} request superseded before coalesce window elapsed");
            return;
        }

        let guard = match timeout(
            Duration::from_millis(SEEK_LOCK_TIMEOUT_MS),
            state.execution_lock.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                log::debug!("[Seek] {player} execution lock busy, dropping stale request");
                return;
            }
        };

        let target = {
            let mut pending = state.pending.lock();
            match pending.take() {
                Some((generation, value)) if generation == my_generation => Some(value),
                Some(other) => {
                    *pending = Some(other);
                    None
                }
                None => None,
            }
        };

        if let Some(seconds) = target {
            executor.execute_seek(player, seconds).await;
        }

        drop(guard);
    }

    /// Drops all tracked state for a player, e.g. on disconnect.
    pub fn remove(&self, player: &PlayerIdentity) {
        self.players.remove(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingExecutor {
        calls: StdMutex<Vec<f64>>,
    }

    #[async_trait]
    impl SeekExecutor for RecordingExecutor {
        async fn execute_seek(&self, _player: &PlayerIdentity, seconds: f64) {
            self.calls.lock().unwrap().push(seconds);
        }
    }

    #[tokio::test]
    async fn rapid_scrub_collapses_to_final_position() {
        let coordinator = SeekCoordinator::new();
        let executor = RecordingExecutor {
            calls: StdMutex::new(Vec::new()),
        };
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");

        let c1 = coordinator.request_seek(&player, 10.0, &executor);
        let c2 = coordinator.request_seek(&player, 20.0, &executor);
        let c3 = coordinator.request_seek(&player, 30.0, &executor);
        tokio::join!(c1, c2, c3);

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[30.0]);
    }

    #[tokio::test]
    async fn single_request_executes() {
        let coordinator = SeekCoordinator::new();
        let executor = RecordingExecutor {
            calls: StdMutex::new(Vec::new()),
        };
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");

        coordinator.request_seek(&player, 42.0, &executor).await;

        assert_eq!(executor.calls.lock().unwrap().as_slice(), &[42.0]);
    }
}
