//! Player transport state machine.
//!
//! Mirrors the Slimproto `STAT` event lifecycle:
//!
//! ```text
//! Disconnected -> Stopped -> Buffering -> Playing <-> Paused
//!                     ^___________________________|
//! ```
//!
//! `STMu` (track finished) is the one event that triggers playlist
//! advancement; `STMd` (decoder underrun/ready) is deliberately ignored —
//! treating it as a transport-state signal caused more spurious advances
//! than it prevented stalls, so it is logged and dropped.

use serde::{Deserialize, Serialize};

use crate::utils::now_millis;

/// Transport state of a player, driven by inbound `STAT` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Disconnected,
    Stopped,
    Buffering,
    Playing,
    Paused,
}

impl PlayerState {
    /// Applies a `STAT` event code, returning the resulting state.
    ///
    /// Unrecognized event codes and `STMd` leave the state unchanged.
    #[must_use]
    pub fn apply_stat_event(self, event: &str) -> Self {
        match event {
            "STMc" => Self::Buffering, // connect: stream established, buffering
            "STMs" => Self::Playing,   // playback started
            "STMp" => Self::Paused,
            "STMr" => Self::Playing, // resume
            "STMu" => Self::Stopped, // underrun: track finished, stop until next queued
            "STMt" => self,          // timer tick, no transition
            "STMh" => self,          // header parsed, no transition
            "STMe" => Self::Stopped, // connection established then immediately closed
            "STMd" => self,          // decoder ready/underrun: ignored by design
            _ => self,
        }
    }
}

/// Live playback status for a player, published as `Event::PlayerStatus`
/// and returned by the JSON-RPC `status` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub volume: u8,
    pub muted: bool,
    pub elapsed_milliseconds: u64,
    pub duration_seconds: f64,
    pub playlist_index: usize,
    pub playlist_tracks: usize,
    /// Generation of the stream slot currently playing, used to decide
    /// whether a late `STMu` should be allowed to advance the playlist.
    pub stream_generation: u64,
    /// Unix millis of the last manual track start, for the
    /// track-finished suppression window.
    pub last_track_start_ms: u64,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Disconnected,
            volume: 100,
            muted: false,
            elapsed_milliseconds: 0,
            duration_seconds: 0.0,
            playlist_index: 0,
            playlist_tracks: 0,
            stream_generation: 0,
            last_track_start_ms: 0,
        }
    }
}

impl PlayerStatus {
    /// Marks a manual track start: bumps generation and timestamps the
    /// suppression window.
    pub fn begin_track(&mut self, generation: u64) {
        self.stream_generation = generation;
        self.last_track_start_ms = now_millis();
        self.state = PlayerState::Buffering;
    }

    /// Whether a `track_finished` signal carrying `event_generation` should
    /// be trusted to advance the playlist.
    ///
    /// Requires both the generation to still match the active stream *and*
    /// the suppression window (see `protocol_constants::TRACK_FINISHED_SUPPRESSION_MS`)
    /// to have elapsed since the last manual track start.
    #[must_use]
    pub fn should_advance_on_track_finished(&self, event_generation: Option<u64>) -> bool {
        let generation_matches = match event_generation {
            Some(g) => g == self.stream_generation,
            None => true,
        };
        let suppression_elapsed = now_millis().saturating_sub(self.last_track_start_ms)
            >= crate::protocol_constants::TRACK_FINISHED_SUPPRESSION_MS;
        generation_matches && suppression_elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stmd_does_not_change_state() {
        let state = PlayerState::Playing;
        assert_eq!(state.apply_stat_event("STMd"), PlayerState::Playing);
    }

    #[test]
    fn stmu_transitions_to_stopped() {
        assert_eq!(PlayerState::Playing.apply_stat_event("STMu"), PlayerState::Stopped);
    }

    #[test]
    fn stale_generation_suppresses_advance() {
        let mut status = PlayerStatus::default();
        status.begin_track(5);
        assert!(!status.should_advance_on_track_finished(Some(4)));
    }

    #[test]
    fn within_suppression_window_blocks_advance_even_with_matching_generation() {
        let mut status = PlayerStatus::default();
        status.begin_track(5);
        assert!(!status.should_advance_on_track_finished(Some(5)));
    }

    #[test]
    fn missing_generation_defers_only_to_suppression_window() {
        let mut status = PlayerStatus::default();
        status.begin_track(5);
        status.last_track_start_ms = 0;
        assert!(status.should_advance_on_track_finished(None));
    }
}
