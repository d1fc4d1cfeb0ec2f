//! Tombstones for files the user removed from the collection

use crate::error::Result;
use crate::models::RemovedTrack;
use crate::store::WriteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait RemovedTrackRepository: Send + Sync {
    /// All tombstones
    async fn list(&self) -> Result<Vec<RemovedTrack>>;

    /// Record a tombstone, refreshing `date_removed` if one already exists
    async fn insert(&self, tx: &mut WriteTransaction, removed: &RemovedTrack) -> Result<()>;

    /// Forget a tombstone so the file can be indexed again
    async fn delete_by_safe_path(&self, tx: &mut WriteTransaction, safe_path: &str)
        -> Result<bool>;
}

pub struct SqliteRemovedTrackRepository {
    pool: SqlitePool,
}

impl SqliteRemovedTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemovedTrackRepository for SqliteRemovedTrackRepository {
    async fn list(&self) -> Result<Vec<RemovedTrack>> {
        let rows = sqlx::query_as::<_, RemovedTrack>(
            "SELECT path, safe_path, date_removed FROM removed_tracks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, tx: &mut WriteTransaction, removed: &RemovedTrack) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO removed_tracks (path, safe_path, date_removed) VALUES (?, ?, ?)
            ON CONFLICT(safe_path) DO UPDATE SET date_removed = excluded.date_removed
            "#,
        )
        .bind(&removed.path)
        .bind(&removed.safe_path)
        .bind(removed.date_removed)
        .execute(tx.conn())
        .await?;
        Ok(())
    }

    async fn delete_by_safe_path(
        &self,
        tx: &mut WriteTransaction,
        safe_path: &str,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM removed_tracks WHERE safe_path = ?")
            .bind(safe_path)
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
