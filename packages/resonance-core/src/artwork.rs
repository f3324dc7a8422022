//! External collaborator trait: album artwork lookup.
//!
//! Like [`crate::library::Library`], artwork storage and retrieval lives
//! outside this crate. The core only needs to ask "does this track/album
//! have art, and what are its bytes" when answering JSON-RPC browse
//! queries or serving an `/artwork/:id` route.

use async_trait::async_trait;

/// Artwork image bytes plus the MIME type to serve them with.
#[derive(Debug, Clone)]
pub struct ArtworkData {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    /// Looks up artwork for a track or album id.
    async fn get_artwork(&self, id: &str) -> Option<ArtworkData>;
}

/// Provider with no artwork, used where no art store is wired up.
pub struct NoArtworkProvider;

#[async_trait]
impl ArtworkProvider for NoArtworkProvider {
    async fn get_artwork(&self, _id: &str) -> Option<ArtworkData> {
        None
    }
}
