//! Album artwork rows: one resolved cache entry per album key

use crate::error::Result;
use crate::models::AlbumArtwork;
use crate::store::WriteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait AlbumArtworkRepository: Send + Sync {
    async fn find(&self, album_key: &str) -> Result<Option<AlbumArtwork>>;

    async fn list(&self) -> Result<Vec<AlbumArtwork>>;

    /// Insert or replace the artwork for `artwork.album_key`
    async fn upsert(&self, tx: &mut WriteTransaction, artwork: &AlbumArtwork) -> Result<()>;

    async fn delete(&self, tx: &mut WriteTransaction, album_key: &str) -> Result<bool>;

    /// Delete rows whose album key no track references. Returns rows deleted.
    async fn delete_unreferenced(&self, tx: &mut WriteTransaction) -> Result<u64>;
}

pub struct SqliteAlbumArtworkRepository {
    pool: SqlitePool,
}

impl SqliteAlbumArtworkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlbumArtworkRepository for SqliteAlbumArtworkRepository {
    async fn find(&self, album_key: &str) -> Result<Option<AlbumArtwork>> {
        let row = sqlx::query_as::<_, AlbumArtwork>(
            "SELECT album_key, artwork_id FROM album_artwork WHERE album_key = ?",
        )
        .bind(album_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<AlbumArtwork>> {
        let rows = sqlx::query_as::<_, AlbumArtwork>(
            "SELECT album_key, artwork_id FROM album_artwork ORDER BY album_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert(&self, tx: &mut WriteTransaction, artwork: &AlbumArtwork) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO album_artwork (album_key, artwork_id) VALUES (?, ?)
            ON CONFLICT(album_key) DO UPDATE SET artwork_id = excluded.artwork_id
            "#,
        )
        .bind(&artwork.album_key)
        .bind(&artwork.artwork_id)
        .execute(tx.conn())
        .await?;
        Ok(())
    }

    async fn delete(&self, tx: &mut WriteTransaction, album_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM album_artwork WHERE album_key = ?")
            .bind(album_key)
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_unreferenced(&self, tx: &mut WriteTransaction) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM album_artwork WHERE album_key NOT IN (SELECT album_key FROM tracks)",
        )
        .execute(tx.conn())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Track;
    use crate::repositories::TrackRepository;
    use crate::store::LibraryStore;

    fn artwork(key: &str, id: &str) -> AlbumArtwork {
        AlbumArtwork {
            album_key: key.to_string(),
            artwork_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = LibraryStore::new(create_test_pool().await.unwrap());
        let repo = store.album_artwork();

        let mut tx = store.begin_write().await.unwrap();
        repo.upsert(&mut tx, &artwork("a|x", "one")).await.unwrap();
        repo.upsert(&mut tx, &artwork("a|x", "two")).await.unwrap();
        tx.commit().await.unwrap();

        let rows = repo.list().await.unwrap();
        assert_eq!(rows, vec![artwork("a|x", "two")]);
    }

    #[tokio::test]
    async fn test_delete_unreferenced() {
        let store = LibraryStore::new(create_test_pool().await.unwrap());
        let repo = store.album_artwork();

        let mut track = Track::new("/m/a.mp3");
        track.album_title = Some("Kept".to_string());
        track.refresh_album_key();
        let kept_key = track.album_key.clone();

        let mut tx = store.begin_write().await.unwrap();
        store.tracks().insert(&mut tx, &track).await.unwrap();
        repo.upsert(&mut tx, &artwork(&kept_key, "k")).await.unwrap();
        repo.upsert(&mut tx, &artwork("gone|", "g")).await.unwrap();
        assert_eq!(repo.delete_unreferenced(&mut tx).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert!(repo.find(&kept_key).await.unwrap().is_some());
        assert!(repo.find("gone|").await.unwrap().is_none());
    }
}
