//! Streaming coordinator: per-player queued file, seek position, and the
//! cancellation token that makes "latest wins" hold for rapid operations.
//!
//! A player has at most one pending stream slot. Queuing a new file always
//! cancels whatever token was previously handed out for that player before
//! installing the new one, and bumps the generation counter. Any in-flight
//! HTTP stream handler holding the old token observes `is_cancelled()` on
//! its next chunk-boundary check and stops — it never races the new stream
//! for bytes on the wire.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::library::Library;
use crate::player::PlayerIdentity;

/// Token threaded through an HTTP stream handler so a superseded or
/// cancelled stream stops sending bytes at its next check rather than
/// running to completion.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    generation: u64,
}

impl CancellationToken {
    fn new(generation: u64) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            generation,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A file queued for a player, with at most one of a time-based or
/// byte-offset-based seek position.
#[derive(Debug, Clone)]
pub struct QueuedFile {
    pub path: PathBuf,
    pub seek_seconds: Option<f64>,
    pub byte_offset: Option<u64>,
}

struct StreamSlot {
    queued: Option<QueuedFile>,
    token: CancellationToken,
}

/// Coordinates what each player is currently streaming.
///
/// This does not own a socket or spawn its own tasks; the HTTP
/// `/stream.mp3` handler and the Slimproto connection both call into it to
/// agree on what bytes a player should currently be receiving.
#[derive(Default)]
pub struct StreamingCoordinator {
    slots: DashMap<PlayerIdentity, StreamSlot>,
    generations: DashMap<PlayerIdentity, AtomicU64>,
}

impl StreamingCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self, player: &PlayerIdentity) -> u64 {
        self.generations
            .entry(player.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    fn install(&self, player: &PlayerIdentity, queued: QueuedFile) -> CancellationToken {
        if let Some(existing) = self.slots.get(player) {
            existing.token.cancel();
        }
        let generation = self.next_generation(player);
        let token = CancellationToken::new(generation);
        self.slots.insert(
            player.clone(),
            StreamSlot {
                queued: Some(queued),
                token: token.clone(),
            },
        );
        token
    }

    /// Queues a plain file with no seek.
    pub fn queue_file(&self, player: &PlayerIdentity, path: PathBuf) -> CancellationToken {
        self.install(
            player,
            QueuedFile {
                path,
                seek_seconds: None,
                byte_offset: None,
            },
        )
    }

    /// Queues a file with a time-based seek (used for formats where the
    /// transcoder can seek by timestamp).
    pub fn queue_file_with_seek(
        &self,
        player: &PlayerIdentity,
        path: PathBuf,
        seek_seconds: f64,
    ) -> CancellationToken {
        self.install(
            player,
            QueuedFile {
                path,
                seek_seconds: Some(seek_seconds),
                byte_offset: None,
            },
        )
    }

    /// Queues a file with a byte-offset seek (used for the direct-stream
    /// VBR approximation path).
    pub fn queue_file_with_byte_offset(
        &self,
        player: &PlayerIdentity,
        path: PathBuf,
        byte_offset: u64,
    ) -> CancellationToken {
        self.install(
            player,
            QueuedFile {
                path,
                seek_seconds: None,
                byte_offset: Some(byte_offset),
            },
        )
    }

    /// Cancels the player's current stream without clearing the queued file.
    pub fn cancel_stream(&self, player: &PlayerIdentity) {
        if let Some(slot) = self.slots.get(player) {
            slot.token.cancel();
        }
    }

    /// Returns a clone of the player's current cancellation token, if any.
    #[must_use]
    pub fn get_cancellation_token(&self, player: &PlayerIdentity) -> Option<CancellationToken> {
        self.slots.get(player).map(|slot| slot.token.clone())
    }

    /// Returns the current stream generation for `player`, or `0` if
    /// nothing has ever been queued for it.
    #[must_use]
    pub fn get_stream_generation(&self, player: &PlayerIdentity) -> u64 {
        self.generations.get(player).map(|g| g.load(Ordering::SeqCst)).unwrap_or(0)
    }

    /// Removes and returns the queued file, if any.
    pub fn dequeue_file(&self, player: &PlayerIdentity) -> Option<QueuedFile> {
        self.slots.get_mut(player).and_then(|mut slot| slot.queued.take())
    }

    /// Peeks at the queued file without removing it.
    #[must_use]
    pub fn get_queued_file(&self, player: &PlayerIdentity) -> Option<QueuedFile> {
        self.slots.get(player).and_then(|slot| slot.queued.clone())
    }

    pub fn clear_seek_position(&self, player: &PlayerIdentity) {
        if let Some(mut slot) = self.slots.get_mut(player) {
            if let Some(queued) = slot.queued.as_mut() {
                queued.seek_seconds = None;
            }
        }
    }

    pub fn clear_byte_offset(&self, player: &PlayerIdentity) {
        if let Some(mut slot) = self.slots.get_mut(player) {
            if let Some(queued) = slot.queued.as_mut() {
                queued.byte_offset = None;
            }
        }
    }

    /// Resolves a playable path for `player`: the queued file first, then
    /// a library lookup keyed by `requested_id`.
    pub async fn resolve_file(
        &self,
        player: &PlayerIdentity,
        requested_id: &str,
        library: &dyn Library,
    ) -> Option<PathBuf> {
        if let Some(queued) = self.get_queued_file(player) {
            return Some(queued.path);
        }
        library.resolve_path(requested_id).await
    }

    /// Removes all state for `player`, e.g. on disconnect.
    pub fn remove(&self, player: &PlayerIdentity) {
        self.slots.remove(player);
        self.generations.remove(player);
    }
}

/// MIME type for a file extension, falling back to a generic octet stream
/// for formats outside the explicit table (`.wma`, `.opus`, anything
/// exotic) so the HTTP route never has to special-case an unknown type.
#[must_use]
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" | "flc" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "aiff" | "aif" => "audio/aiff",
        "m4a" | "m4b" | "mp4" | "m4p" | "m4r" | "alac" | "aac" => "audio/mp4",
        "wma" => "audio/x-ms-wma",
        "opus" => "audio/opus",
        _ => "application/octet-stream",
    }
}

/// A parsed HTTP `Range` header, clamped to a known file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Parses a single-range `Range: bytes=start-end` header value, clamping
/// both ends to `file_size - 1`. Returns `None` for anything malformed or
/// multi-range (multi-range requests are not supported).
#[must_use]
pub fn parse_range_header(value: &str, file_size: u64) -> Option<ByteRange> {
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;
    let last_byte = file_size.saturating_sub(1);

    let (start, end) = if start_str.is_empty() {
        // Suffix range: last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        let start = file_size.saturating_sub(suffix_len);
        (start, last_byte)
    } else {
        let start: u64 = start_str.parse().ok()?;
        let end = if end_str.is_empty() {
            last_byte
        } else {
            end_str.parse::<u64>().ok()?.min(last_byte)
        };
        (start, end)
    };

    if start > last_byte || start > end {
        return None;
    }

    Some(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_file_cancels_prior_token() {
        let coordinator = StreamingCoordinator::new();
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");
        let first = coordinator.queue_file(&player, PathBuf::from("/music/a.mp3"));
        let _second = coordinator.queue_file(&player, PathBuf::from("/music/b.mp3"));
        assert!(first.is_cancelled());
    }

    #[test]
    fn generation_increments_on_each_queue() {
        let coordinator = StreamingCoordinator::new();
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");
        let first = coordinator.queue_file(&player, PathBuf::from("/music/a.mp3"));
        let second = coordinator.queue_file(&player, PathBuf::from("/music/b.mp3"));
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[test]
    fn get_stream_generation_reflects_last_queue() {
        let coordinator = StreamingCoordinator::new();
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");
        assert_eq!(coordinator.get_stream_generation(&player), 0);
        let token = coordinator.queue_file(&player, PathBuf::from("/music/a.mp3"));
        assert_eq!(coordinator.get_stream_generation(&player), token.generation());
    }

    #[test]
    fn dequeue_file_removes_queued_entry() {
        let coordinator = StreamingCoordinator::new();
        let player = PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff");
        coordinator.queue_file(&player, PathBuf::from("/music/a.mp3"));
        assert!(coordinator.dequeue_file(&player).is_some());
        assert!(coordinator.get_queued_file(&player).is_none());
    }

    #[test]
    fn range_header_clamps_to_file_size() {
        let range = parse_range_header("bytes=100-999999", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 100, end: 999 });
    }

    #[test]
    fn suffix_range_returns_last_n_bytes() {
        let range = parse_range_header("bytes=-500", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 500, end: 999 });
    }

    #[test]
    fn open_ended_range_goes_to_end_of_file() {
        let range = parse_range_header("bytes=900-", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 900, end: 999 });
    }

    #[test]
    fn multi_range_is_rejected() {
        assert!(parse_range_header("bytes=0-10,20-30", 1000).is_none());
    }

    #[test]
    fn content_type_falls_back_for_unknown_extension() {
        assert_eq!(content_type_for_extension("xyz"), "application/octet-stream");
        assert_eq!(content_type_for_extension("wma"), "audio/x-ms-wma");
    }
}
