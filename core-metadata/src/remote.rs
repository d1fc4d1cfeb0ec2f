//! Remote artwork lookup seam.
//!
//! The enricher consults a [`RemoteArtworkLookup`] for albums whose files
//! carry no embedded cover. The MusicBrainz implementation lives in
//! [`crate::providers`] behind the `artwork-remote` feature.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Query describing the album to look up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumQuery {
    pub album_title: Option<String>,
    pub album_artists: Vec<String>,
    pub track_title: Option<String>,
    pub artists: Vec<String>,
}

impl AlbumQuery {
    /// The artist to search with: album artist first, then track artist.
    pub fn primary_artist(&self) -> Option<&str> {
        self.album_artists
            .first()
            .or_else(|| self.artists.first())
            .map(String::as_str)
    }
}

#[async_trait]
pub trait RemoteArtworkLookup: Send + Sync {
    /// Fetch a cover for the album.
    ///
    /// `Ok(None)` means the service has no cover for it.
    async fn fetch_album_art(&self, query: &AlbumQuery) -> Result<Option<Bytes>>;
}
