//! Domain models for the collection catalog
//!
//! Row types map 1:1 onto the tables created by the migrations. All
//! timestamps are Unix milliseconds ("ticks").

use crate::path::safe_path;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

/// Separator used when persisting multi-valued tag fields.
pub const MULTI_VALUE_SEPARATOR: &str = ";";

/// Current time in ticks.
pub fn now_ticks() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Join multi-valued tag fields for storage. Empty input maps to `None`.
pub fn join_multi(values: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(MULTI_VALUE_SEPARATOR))
    }
}

/// Split a stored multi-valued field back into its parts.
pub fn split_multi(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(MULTI_VALUE_SEPARATOR)
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Derive the album grouping key from album title and album artists.
///
/// Returns an empty string when the title is blank; such tracks are never
/// grouped into an album and never receive album artwork.
pub fn album_key(album_title: Option<&str>, album_artists: &[String]) -> String {
    let title = album_title.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return String::new();
    }

    let mut artists: Vec<String> = album_artists
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    artists.sort();

    format!(
        "{}|{}",
        title.to_lowercase(),
        artists.join(MULTI_VALUE_SEPARATOR)
    )
}

// =============================================================================
// Tracks
// =============================================================================

/// One media file in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// Stable integer identifier (0 until persisted)
    pub id: i64,
    /// Filesystem path as discovered
    pub path: String,
    /// Canonical key, unique across the table
    pub safe_path: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub file_size: i64,

    // Audio properties
    pub bit_rate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub duration_ms: Option<i64>,

    // Tags
    pub track_title: Option<String>,
    pub artists: Option<String>,
    pub genres: Option<String>,
    pub album_title: Option<String>,
    pub album_artists: Option<String>,
    pub album_key: String,
    pub track_number: Option<i64>,
    pub track_count: Option<i64>,
    pub disc_number: Option<i64>,
    pub disc_count: Option<i64>,
    pub year: Option<i64>,
    pub has_lyrics: bool,

    // Bookkeeping
    pub date_added: i64,
    /// File modification time recorded at the last extraction
    pub date_file_modified: i64,
    pub needs_indexing: bool,
    pub needs_album_artwork_indexing: bool,
    pub indexing_success: bool,
    pub indexing_failure_reason: Option<String>,

    // Play statistics
    pub rating: i64,
    pub love: i64,
    pub play_count: i64,
    pub skip_count: i64,
    pub date_last_played: Option<i64>,
}

impl Track {
    /// Skeleton row for a newly discovered file.
    ///
    /// The row needs indexing and artwork indexing until the extractor and
    /// the enricher have run.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());

        Self {
            id: 0,
            safe_path: safe_path(&path_str),
            path: path_str,
            file_name,
            mime_type: None,
            file_size: 0,
            bit_rate: None,
            sample_rate: None,
            duration_ms: None,
            track_title: None,
            artists: None,
            genres: None,
            album_title: None,
            album_artists: None,
            album_key: String::new(),
            track_number: None,
            track_count: None,
            disc_number: None,
            disc_count: None,
            year: None,
            has_lyrics: false,
            date_added: now_ticks(),
            date_file_modified: 0,
            needs_indexing: true,
            needs_album_artwork_indexing: true,
            indexing_success: false,
            indexing_failure_reason: None,
            rating: 0,
            love: 0,
            play_count: 0,
            skip_count: 0,
            date_last_played: None,
        }
    }

    pub fn artist_list(&self) -> Vec<String> {
        split_multi(self.artists.as_deref())
    }

    pub fn album_artist_list(&self) -> Vec<String> {
        split_multi(self.album_artists.as_deref())
    }

    pub fn genre_list(&self) -> Vec<String> {
        split_multi(self.genres.as_deref())
    }

    /// Recompute `album_key` from the current album fields.
    pub fn refresh_album_key(&mut self) {
        self.album_key = album_key(self.album_title.as_deref(), &self.album_artist_list());
    }

    /// Validate the track before persisting
    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Track path cannot be empty".to_string());
        }
        if self.safe_path.trim().is_empty() {
            return Err("Track safe path cannot be empty".to_string());
        }
        if self.safe_path != safe_path(&self.path) {
            return Err(format!(
                "Track safe path '{}' does not match path '{}'",
                self.safe_path, self.path
            ));
        }
        if self.file_size < 0 {
            return Err("File size cannot be negative".to_string());
        }
        if let Some(duration) = self.duration_ms {
            if duration < 0 {
                return Err("Duration cannot be negative".to_string());
            }
        }
        if !self.indexing_success && self.indexing_failure_reason.is_none() && !self.needs_indexing
        {
            return Err("Failed extraction must record a failure reason".to_string());
        }
        Ok(())
    }
}

/// Lightweight projection used to plan reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TrackSnapshot {
    pub id: i64,
    pub path: String,
    pub safe_path: String,
    pub date_file_modified: i64,
    pub needs_indexing: bool,
    /// Whether at least one folder maps to this track
    pub has_folder: bool,
}

// =============================================================================
// Folders
// =============================================================================

/// A collection root configured by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub safe_path: String,
    pub show_in_collection: bool,
}

impl Folder {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: 0,
            safe_path: safe_path(&path),
            path,
            show_in_collection: true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Folder path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Membership of a track in a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct FolderTrack {
    pub folder_id: i64,
    pub track_id: i64,
}

// =============================================================================
// Tombstones, artwork, legacy statistics
// =============================================================================

/// A file the user removed; it is not re-added unless removal is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RemovedTrack {
    pub path: String,
    pub safe_path: String,
    pub date_removed: i64,
}

impl RemovedTrack {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            safe_path: safe_path(&path),
            path,
            date_removed: now_ticks(),
        }
    }
}

/// Resolved artwork for one album key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AlbumArtwork {
    pub album_key: String,
    /// Key into the artwork cache
    pub artwork_id: String,
}

/// Play statistics stored by older releases in a separate table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TrackStatistic {
    pub safe_path: String,
    pub rating: i64,
    pub love: i64,
    pub play_count: i64,
    pub skip_count: i64,
    pub date_last_played: Option<i64>,
}
