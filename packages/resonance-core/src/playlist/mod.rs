//! Per-player playlist (queue) management.
//!
//! Each connected player gets its own in-memory `Playlist`. This is
//! deliberately not persisted or database-backed — a player's queue lives
//! for the duration of the connection.

use std::path::Path;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::library::TrackInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    Off,
    On,
}

/// A track in a playlist. Both `track_id` and `path` are kept so the
/// playlist still works when only a bare path was queued (no library
/// lookup available yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTrack {
    pub track_id: Option<String>,
    pub path: String,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
}

impl PlaylistTrack {
    /// Builds a track from just a file path, using the file stem as a
    /// placeholder title until richer metadata is available.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let title = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            track_id: None,
            path: path.to_string(),
            album_id: None,
            artist_id: None,
            title,
            artist: String::new(),
            album: String::new(),
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn from_track_info(info: &TrackInfo) -> Self {
        Self {
            track_id: Some(info.track_id.clone()),
            path: info.path.to_string_lossy().to_string(),
            album_id: None,
            artist_id: None,
            title: info.title.clone(),
            artist: info.artist.clone(),
            album: info.album.clone(),
            duration_ms: info.duration_ms,
        }
    }
}

/// Ordered queue of tracks for a single player, with repeat/shuffle modes
/// and next/previous navigation.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub player_id: String,
    tracks: Vec<PlaylistTrack>,
    current_index: usize,
    repeat_mode: RepeatMode,
    shuffle_mode: ShuffleMode,
    original_order: Vec<PlaylistTrack>,
}

impl Playlist {
    #[must_use]
    pub fn new(player_id: String) -> Self {
        Self {
            player_id,
            tracks: Vec::new(),
            current_index: 0,
            repeat_mode: RepeatMode::Off,
            shuffle_mode: ShuffleMode::Off,
            original_order: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn current_track(&self) -> Option<&PlaylistTrack> {
        if self.is_empty() || self.current_index >= self.tracks.len() {
            return None;
        }
        self.tracks.get(self.current_index)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        match self.repeat_mode {
            RepeatMode::One | RepeatMode::All => true,
            RepeatMode::Off => self.current_index < self.tracks.len() - 1,
        }
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        match self.repeat_mode {
            RepeatMode::One | RepeatMode::All => true,
            RepeatMode::Off => self.current_index > 0,
        }
    }

    /// Adds a track, optionally inserting at `position` rather than
    /// appending. Returns the index it was inserted at.
    ///
    /// When the playlist was empty before this call, `current_index`
    /// deliberately stays at `0` rather than shifting forward — otherwise
    /// the newly inserted first track would not be "current", and a
    /// manual start would immediately skip to the following track.
    pub fn add(&mut self, track: PlaylistTrack, position: Option<usize>) -> usize {
        let was_empty = self.is_empty();
        match position {
            None => {
                self.tracks.push(track);
                self.tracks.len() - 1
            }
            Some(pos) => {
                let pos = pos.min(self.tracks.len());
                self.tracks.insert(pos, track);
                if !was_empty && pos <= self.current_index {
                    self.current_index += 1;
                }
                pos
            }
        }
    }

    pub fn add_path(&mut self, path: &str, position: Option<usize>) -> usize {
        self.add(PlaylistTrack::from_path(path), position)
    }

    /// Removes the track at `index`, adjusting `current_index` to stay
    /// valid and pointed at the same logical track where possible.
    pub fn remove(&mut self, index: usize) -> Option<PlaylistTrack> {
        if index >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(index);

        if index < self.current_index {
            self.current_index -= 1;
        } else if index == self.current_index && self.current_index >= self.tracks.len() {
            self.current_index = self.tracks.len().saturating_sub(1);
        }

        Some(track)
    }

    /// Clears the playlist and returns how many tracks were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.tracks.len();
        self.tracks.clear();
        self.original_order.clear();
        self.current_index = 0;
        count
    }

    /// Jumps to `index` (clamped into range) and returns the track there.
    pub fn play(&mut self, index: usize) -> Option<&PlaylistTrack> {
        if self.is_empty() {
            return None;
        }
        self.current_index = index.min(self.tracks.len() - 1);
        self.current_track()
    }

    /// Advances to the next track, respecting repeat mode.
    pub fn next(&mut self) -> Option<&PlaylistTrack> {
        if self.is_empty() {
            return None;
        }
        if self.repeat_mode == RepeatMode::One {
            return self.current_track();
        }
        if self.current_index < self.tracks.len() - 1 {
            self.current_index += 1;
        } else if self.repeat_mode == RepeatMode::All {
            self.current_index = 0;
        } else {
            return None;
        }
        self.current_track()
    }

    /// Moves to the previous track, respecting repeat mode.
    pub fn previous(&mut self) -> Option<&PlaylistTrack> {
        if self.is_empty() {
            return None;
        }
        if self.repeat_mode == RepeatMode::One {
            return self.current_track();
        }
        if self.current_index > 0 {
            self.current_index -= 1;
        } else if self.repeat_mode == RepeatMode::All {
            self.current_index = self.tracks.len() - 1;
        } else {
            return None;
        }
        self.current_track()
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    #[must_use]
    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    #[must_use]
    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    /// Enables or disables shuffle. Enabling saves the original order and
    /// randomizes everything but the current track, which is kept at the
    /// front so playback doesn't jump. Disabling restores the saved order
    /// and relocates the current track within it.
    pub fn set_shuffle(&mut self, mode: ShuffleMode) {
        if mode == ShuffleMode::On && self.shuffle_mode == ShuffleMode::Off {
            self.original_order = self.tracks.clone();
            let current = self.current_track().cloned();

            let mut others: Vec<PlaylistTrack> = self
                .tracks
                .iter()
                .filter(|t| Some((*t).clone()) != current)
                .cloned()
                .collect();
            others.shuffle(&mut rand::thread_rng());

            if let Some(current) = current {
                let mut reordered = Vec::with_capacity(others.len() + 1);
                reordered.push(current);
                reordered.extend(others);
                self.tracks = reordered;
                self.current_index = 0;
            } else {
                self.tracks = others;
            }
        } else if mode == ShuffleMode::Off && self.shuffle_mode == ShuffleMode::On {
            if !self.original_order.is_empty() {
                let current = self.current_track().cloned();
                self.tracks = std::mem::take(&mut self.original_order);
                self.current_index = current.and_then(|c| self.tracks.iter().position(|t| *t == c)).unwrap_or(0);
            }
        }
        self.shuffle_mode = mode;
    }

    /// Track info for JSON-RPC playlist responses.
    #[must_use]
    pub fn tracks_info(&self) -> Vec<Value> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                json!({
                    "playlist index": i,
                    "id": t.track_id,
                    "title": t.title,
                    "artist": t.artist,
                    "album": t.album,
                    "album_id": t.album_id,
                    "artist_id": t.artist_id,
                    "duration": t.duration_ms / 1000,
                    "url": t.path,
                })
            })
            .collect()
    }
}

/// Central registry of one playlist per connected player, keyed by player
/// id (MAC address).
#[derive(Default)]
pub struct PlaylistManager {
    playlists: DashMap<String, Playlist>,
}

impl PlaylistManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the player's playlist, creating one if it doesn't
    /// exist yet.
    pub fn with_playlist<R>(&self, player_id: &str, f: impl FnOnce(&mut Playlist) -> R) -> R {
        let mut entry = self
            .playlists
            .entry(player_id.to_string())
            .or_insert_with(|| Playlist::new(player_id.to_string()));
        f(&mut entry)
    }

    pub fn remove(&self, player_id: &str) -> Option<Playlist> {
        self.playlists.remove(player_id).map(|(_, p)| p)
    }

    pub fn clear_all(&self) -> usize {
        let count = self.playlists.len();
        self.playlists.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    #[must_use]
    pub fn contains(&self, player_id: &str) -> bool {
        self.playlists.contains_key(player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_empty_playlist_keeps_current_index_at_zero() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", Some(0));
        assert_eq!(playlist.current_index(), 0);
    }

    #[test]
    fn insert_before_current_shifts_index() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", None);
        playlist.add_path("/music/b.mp3", None);
        playlist.play(1);
        playlist.add_path("/music/c.mp3", Some(0));
        assert_eq!(playlist.current_index(), 2);
    }

    #[test]
    fn next_wraps_when_repeat_all() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", None);
        playlist.add_path("/music/b.mp3", None);
        playlist.set_repeat(RepeatMode::All);
        playlist.play(1);
        assert_eq!(playlist.next().unwrap().path, "/music/a.mp3");
    }

    #[test]
    fn next_returns_none_at_end_without_repeat() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", None);
        assert!(playlist.next().is_none());
    }

    #[test]
    fn repeat_one_returns_same_track() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", None);
        playlist.add_path("/music/b.mp3", None);
        playlist.set_repeat(RepeatMode::One);
        assert_eq!(playlist.next().unwrap().path, "/music/a.mp3");
    }

    #[test]
    fn remove_current_last_track_clamps_index() {
        let mut playlist = Playlist::new("p1".to_string());
        playlist.add_path("/music/a.mp3", None);
        playlist.add_path("/music/b.mp3", None);
        playlist.play(1);
        playlist.remove(1);
        assert_eq!(playlist.current_index(), 0);
    }

    #[test]
    fn shuffle_keeps_current_track_first_then_restores_order() {
        let mut playlist = Playlist::new("p1".to_string());
        for p in ["/a.mp3", "/b.mp3", "/c.mp3", "/d.mp3"] {
            playlist.add_path(p, None);
        }
        playlist.play(2);
        let current_path = playlist.current_track().unwrap().path.clone();
        playlist.set_shuffle(ShuffleMode::On);
        assert_eq!(playlist.current_track().unwrap().path, current_path);

        playlist.set_shuffle(ShuffleMode::Off);
        assert_eq!(
            playlist.tracks.iter().map(|t| t.path.clone()).collect::<Vec<_>>(),
            vec!["/a.mp3", "/b.mp3", "/c.mp3", "/d.mp3"]
        );
    }

    #[test]
    fn manager_get_or_create_is_idempotent() {
        let manager = PlaylistManager::new();
        manager.with_playlist("aa:bb", |p| p.add_path("/a.mp3", None));
        assert_eq!(manager.with_playlist("aa:bb", |p| p.len()), 1);
        assert_eq!(manager.len(), 1);
    }
}
