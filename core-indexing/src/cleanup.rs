//! Artwork cleanup after reconciliation.
//!
//! Keeps `album_artwork` rows and the cover cache consistent with the
//! catalog:
//!
//! 1. rows whose album key no track references are deleted
//! 2. rows whose cached file is gone are deleted and their albums re-flagged
//! 3. cached files no row references are deleted

use crate::error::Result;
use core_library::repositories::{AlbumArtworkRepository, TrackRepository};
use core_library::LibraryStore;
use core_metadata::ArtworkCache;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub unreferenced_rows: u64,
    pub missing_files: u64,
    pub orphan_files: u64,
}

impl CleanupSummary {
    /// Whether catalog rows changed. Deleting orphan files alone does not count.
    pub fn changed(&self) -> bool {
        self.unreferenced_rows > 0 || self.missing_files > 0
    }
}

pub struct ArtworkCleanup {
    store: LibraryStore,
    cache: Arc<dyn ArtworkCache>,
}

impl ArtworkCleanup {
    pub fn new(store: LibraryStore, cache: Arc<dyn ArtworkCache>) -> Self {
        Self { store, cache }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<CleanupSummary> {
        let artwork = self.store.album_artwork();
        let tracks = self.store.tracks();
        let mut summary = CleanupSummary::default();

        let mut tx = self.store.begin_write().await?;
        summary.unreferenced_rows = artwork.delete_unreferenced(&mut tx).await?;
        tx.commit().await?;

        let rows = artwork.list().await?;
        let mut missing = Vec::new();
        let mut referenced = HashSet::with_capacity(rows.len());
        for row in rows {
            if self.cache.exists(&row.artwork_id).await {
                referenced.insert(row.artwork_id);
            } else {
                missing.push(row.album_key);
            }
        }

        if !missing.is_empty() {
            let mut tx = self.store.begin_write().await?;
            for album_key in &missing {
                artwork.delete(&mut tx, album_key).await?;
                tracks.flag_artwork_for_album(&mut tx, album_key).await?;
            }
            tx.commit().await?;
            summary.missing_files = missing.len() as u64;
        }

        for artwork_id in self.cache.list_ids().await? {
            if referenced.contains(&artwork_id) {
                continue;
            }
            match self.cache.delete(&artwork_id).await {
                Ok(true) => summary.orphan_files += 1,
                Ok(false) => {}
                Err(e) => warn!(artwork_id = %artwork_id, error = %e, "Failed to delete cached artwork"),
            }
        }

        if summary.changed() || summary.orphan_files > 0 {
            info!(
                unreferenced_rows = summary.unreferenced_rows,
                missing_files = summary.missing_files,
                orphan_files = summary.orphan_files,
                "Artwork cleanup complete"
            );
        }
        Ok(summary)
    }
}
