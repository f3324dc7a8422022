//! External collaborator trait: the music library.
//!
//! Resonance's core deliberately does not implement library scanning,
//! tagging, or a database — per the scope of this server, that lives
//! behind whatever implements this trait. The core only needs to resolve a
//! track id to a file on disk and to look up metadata for playlist/status
//! responses.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal track metadata the core needs to answer JSON-RPC browse/status
/// queries and build `PlaylistTrack`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: String,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
}

/// A page of browse results: the items plus the total count so the
/// JSON-RPC layer can report `count` alongside a `start`/`items` window.
#[derive(Debug, Clone, Default)]
pub struct BrowsePage {
    pub items: Vec<Value>,
    pub total: u64,
}

/// Common pagination/filter parameters shared by the browse commands
/// (`artists`, `albums`, `titles`, `genres`, `search`).
#[derive(Debug, Clone, Default)]
pub struct BrowseParams {
    pub start: usize,
    pub count: usize,
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub genre_id: Option<String>,
    pub search: Option<String>,
}

/// External collaborator that resolves track ids to files and metadata,
/// and browses the catalog for the JSON-RPC surface.
///
/// Implemented outside this crate (a database-backed scanner, a flat-file
/// index, whatever); the core only consumes it through this trait. Default
/// method bodies return empty pages, so an implementor only needs to
/// override the browse surfaces it actually supports.
#[async_trait]
pub trait Library: Send + Sync {
    /// Resolves a track id to its on-disk path, if known.
    async fn resolve_path(&self, track_id: &str) -> Option<PathBuf>;

    /// Looks up metadata for a track id.
    async fn track_info(&self, track_id: &str) -> Option<TrackInfo>;

    async fn total_tracks(&self) -> u64 {
        0
    }

    async fn total_albums(&self) -> u64 {
        0
    }

    async fn total_artists(&self) -> u64 {
        0
    }

    async fn artists(&self, _params: &BrowseParams) -> BrowsePage {
        BrowsePage::default()
    }

    async fn albums(&self, _params: &BrowseParams) -> BrowsePage {
        BrowsePage::default()
    }

    async fn titles(&self, _params: &BrowseParams) -> BrowsePage {
        BrowsePage::default()
    }

    async fn genres(&self, _params: &BrowseParams) -> BrowsePage {
        BrowsePage::default()
    }

    async fn roles(&self) -> Vec<Value> {
        Vec::new()
    }

    async fn search(&self, _params: &BrowseParams) -> BrowsePage {
        BrowsePage::default()
    }
}

/// Library with no tracks, used where no real catalog is wired up (tests,
/// a Slimproto-only deployment with no browsing surface).
pub struct EmptyLibrary;

#[async_trait]
impl Library for EmptyLibrary {
    async fn resolve_path(&self, _track_id: &str) -> Option<PathBuf> {
        None
    }

    async fn track_info(&self, _track_id: &str) -> Option<TrackInfo> {
        None
    }
}
