//! Track repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{FolderTrack, Track, TrackSnapshot};
use crate::store::WriteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Track repository interface.
///
/// Reads run against the pool. Mutations take a [`WriteTransaction`] so the
/// caller decides the batch boundary and holds the write lock.
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its ID
    async fn find_by_id(&self, id: i64) -> Result<Option<Track>>;

    /// Find a track by its canonical safe path
    async fn find_by_safe_path(&self, safe_path: &str) -> Result<Option<Track>>;

    /// Load full rows for the given IDs (missing IDs are skipped)
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Track>>;

    /// Count all tracks
    async fn count(&self) -> Result<i64>;

    /// Planning projection of every track
    async fn snapshot(&self) -> Result<Vec<TrackSnapshot>>;

    /// Every `(safe_path, id)` pair, used to seed the indexer cache
    async fn safe_path_index(&self) -> Result<Vec<(String, i64)>>;

    /// Every folder/track membership row
    async fn folder_links(&self) -> Result<Vec<FolderTrack>>;

    /// Distinct album keys of tracks flagged for artwork indexing
    ///
    /// The empty key is included when unnamed albums are flagged.
    async fn album_keys_needing_artwork(&self) -> Result<Vec<String>>;

    /// Most recently modified track belonging to `album_key`
    async fn latest_for_album(&self, album_key: &str) -> Result<Option<Track>>;

    /// Insert a new track and return its ID
    ///
    /// # Errors
    /// Returns error if validation fails or the safe path already exists.
    async fn insert(&self, tx: &mut WriteTransaction, track: &Track) -> Result<i64>;

    /// Overwrite metadata and indexing fields of an existing track.
    ///
    /// Identity, `date_added` and play statistics are left untouched.
    async fn update_metadata(&self, tx: &mut WriteTransaction, track: &Track) -> Result<()>;

    /// Delete a track by ID
    ///
    /// # Returns
    /// - `Ok(true)` if the track was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, tx: &mut WriteTransaction, id: i64) -> Result<bool>;

    /// Delete every track that no folder maps to. Returns the number deleted.
    async fn delete_orphans(&self, tx: &mut WriteTransaction) -> Result<u64>;

    /// Record folder membership. Returns `false` when the link already existed.
    async fn link_folder(
        &self,
        tx: &mut WriteTransaction,
        folder_id: i64,
        track_id: i64,
    ) -> Result<bool>;

    /// Clear the artwork flag on every track of `album_key`
    async fn clear_artwork_flag(&self, tx: &mut WriteTransaction, album_key: &str) -> Result<u64>;

    /// Set the artwork flag on every track of `album_key`
    async fn flag_artwork_for_album(
        &self,
        tx: &mut WriteTransaction,
        album_key: &str,
    ) -> Result<u64>;

    /// Set the artwork flag on all tracks, or only on albums without artwork
    async fn flag_artwork(&self, tx: &mut WriteTransaction, only_when_missing: bool)
        -> Result<u64>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn validate_track(track: &Track) -> Result<()> {
        track.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "Track".to_string(),
            message: msg,
        })
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(track)
    }

    async fn find_by_safe_path(&self, safe_path: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE safe_path = ?")
            .bind(safe_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(track)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Track>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tracks = Vec::with_capacity(ids.len());
        // SQLite caps bound parameters per statement
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT * FROM tracks WHERE id IN ({placeholders}) ORDER BY id");
            let mut query = sqlx::query_as::<_, Track>(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            tracks.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(tracks)
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn snapshot(&self) -> Result<Vec<TrackSnapshot>> {
        let rows = sqlx::query_as::<_, TrackSnapshot>(
            r#"
            SELECT t.id, t.path, t.safe_path, t.date_file_modified, t.needs_indexing,
                   EXISTS (SELECT 1 FROM folder_tracks ft WHERE ft.track_id = t.id) AS has_folder
            FROM tracks t
            ORDER BY t.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn safe_path_index(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>("SELECT safe_path, id FROM tracks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn folder_links(&self) -> Result<Vec<FolderTrack>> {
        let rows = sqlx::query_as::<_, FolderTrack>("SELECT folder_id, track_id FROM folder_tracks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn album_keys_needing_artwork(&self) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT album_key FROM tracks
            WHERE needs_album_artwork_indexing = 1
            ORDER BY album_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn latest_for_album(&self, album_key: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>(
            r#"
            SELECT * FROM tracks
            WHERE album_key = ?
            ORDER BY date_file_modified DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(album_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(track)
    }

    async fn insert(&self, tx: &mut WriteTransaction, track: &Track) -> Result<i64> {
        Self::validate_track(track)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tracks (
                path, safe_path, file_name, mime_type, file_size,
                bit_rate, sample_rate, duration_ms,
                track_title, artists, genres, album_title, album_artists, album_key,
                track_number, track_count, disc_number, disc_count, year, has_lyrics,
                date_added, date_file_modified,
                needs_indexing, needs_album_artwork_indexing,
                indexing_success, indexing_failure_reason,
                rating, love, play_count, skip_count, date_last_played
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(&track.path)
        .bind(&track.safe_path)
        .bind(&track.file_name)
        .bind(&track.mime_type)
        .bind(track.file_size)
        .bind(track.bit_rate)
        .bind(track.sample_rate)
        .bind(track.duration_ms)
        .bind(&track.track_title)
        .bind(&track.artists)
        .bind(&track.genres)
        .bind(&track.album_title)
        .bind(&track.album_artists)
        .bind(&track.album_key)
        .bind(track.track_number)
        .bind(track.track_count)
        .bind(track.disc_number)
        .bind(track.disc_count)
        .bind(track.year)
        .bind(track.has_lyrics)
        .bind(track.date_added)
        .bind(track.date_file_modified)
        .bind(track.needs_indexing)
        .bind(track.needs_album_artwork_indexing)
        .bind(track.indexing_success)
        .bind(&track.indexing_failure_reason)
        .bind(track.rating)
        .bind(track.love)
        .bind(track.play_count)
        .bind(track.skip_count)
        .bind(track.date_last_played)
        .execute(tx.conn())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_metadata(&self, tx: &mut WriteTransaction, track: &Track) -> Result<()> {
        Self::validate_track(track)?;

        let result = sqlx::query(
            r#"
            UPDATE tracks SET
                mime_type = ?, file_size = ?,
                bit_rate = ?, sample_rate = ?, duration_ms = ?,
                track_title = ?, artists = ?, genres = ?,
                album_title = ?, album_artists = ?, album_key = ?,
                track_number = ?, track_count = ?, disc_number = ?, disc_count = ?,
                year = ?, has_lyrics = ?,
                date_file_modified = ?,
                needs_indexing = ?, needs_album_artwork_indexing = ?,
                indexing_success = ?, indexing_failure_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(&track.mime_type)
        .bind(track.file_size)
        .bind(track.bit_rate)
        .bind(track.sample_rate)
        .bind(track.duration_ms)
        .bind(&track.track_title)
        .bind(&track.artists)
        .bind(&track.genres)
        .bind(&track.album_title)
        .bind(&track.album_artists)
        .bind(&track.album_key)
        .bind(track.track_number)
        .bind(track.track_count)
        .bind(track.disc_number)
        .bind(track.disc_count)
        .bind(track.year)
        .bind(track.has_lyrics)
        .bind(track.date_file_modified)
        .bind(track.needs_indexing)
        .bind(track.needs_album_artwork_indexing)
        .bind(track.indexing_success)
        .bind(&track.indexing_failure_reason)
        .bind(track.id)
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Track".to_string(),
                id: track.id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete(&self, tx: &mut WriteTransaction, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_orphans(&self, tx: &mut WriteTransaction) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM tracks WHERE id NOT IN (SELECT track_id FROM folder_tracks)",
        )
        .execute(tx.conn())
        .await?;
        Ok(result.rows_affected())
    }

    async fn link_folder(
        &self,
        tx: &mut WriteTransaction,
        folder_id: i64,
        track_id: i64,
    ) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO folder_tracks (folder_id, track_id) VALUES (?, ?)")
                .bind(folder_id)
                .bind(track_id)
                .execute(tx.conn())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_artwork_flag(&self, tx: &mut WriteTransaction, album_key: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tracks SET needs_album_artwork_indexing = 0 WHERE album_key = ?",
        )
        .bind(album_key)
        .execute(tx.conn())
        .await?;
        Ok(result.rows_affected())
    }

    async fn flag_artwork_for_album(
        &self,
        tx: &mut WriteTransaction,
        album_key: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tracks SET needs_album_artwork_indexing = 1 WHERE album_key = ?",
        )
        .bind(album_key)
        .execute(tx.conn())
        .await?;
        Ok(result.rows_affected())
    }

    async fn flag_artwork(
        &self,
        tx: &mut WriteTransaction,
        only_when_missing: bool,
    ) -> Result<u64> {
        let sql = if only_when_missing {
            r#"
            UPDATE tracks SET needs_album_artwork_indexing = 1
            WHERE album_key NOT IN (SELECT album_key FROM album_artwork)
            "#
        } else {
            "UPDATE tracks SET needs_album_artwork_indexing = 1"
        };

        let result = sqlx::query(sql).execute(tx.conn()).await?;
        Ok(result.rows_affected())
    }
}
