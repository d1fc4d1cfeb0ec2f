//! Legacy play statistics
//!
//! Older releases kept ratings and play counts in `track_statistics`,
//! keyed by safe path. They are folded into `tracks` once the matching
//! rows exist, then dropped from the legacy table.

use crate::error::Result;
use crate::models::TrackStatistic;
use crate::store::WriteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait TrackStatisticRepository: Send + Sync {
    /// Number of legacy rows still waiting to be migrated
    async fn pending_count(&self) -> Result<i64>;

    async fn insert(&self, tx: &mut WriteTransaction, statistic: &TrackStatistic) -> Result<()>;

    /// Copy legacy statistics onto matching tracks and delete the migrated rows.
    ///
    /// Rows without a matching track are kept for a later run.
    /// Returns the number of tracks updated.
    async fn migrate_into_tracks(&self, tx: &mut WriteTransaction) -> Result<u64>;
}

pub struct SqliteTrackStatisticRepository {
    pool: SqlitePool,
}

impl SqliteTrackStatisticRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackStatisticRepository for SqliteTrackStatisticRepository {
    async fn pending_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM track_statistics")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert(&self, tx: &mut WriteTransaction, statistic: &TrackStatistic) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO track_statistics
                (safe_path, rating, love, play_count, skip_count, date_last_played)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&statistic.safe_path)
        .bind(statistic.rating)
        .bind(statistic.love)
        .bind(statistic.play_count)
        .bind(statistic.skip_count)
        .bind(statistic.date_last_played)
        .execute(tx.conn())
        .await?;
        Ok(())
    }

    async fn migrate_into_tracks(&self, tx: &mut WriteTransaction) -> Result<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE tracks SET
                rating = s.rating,
                love = s.love,
                play_count = s.play_count,
                skip_count = s.skip_count,
                date_last_played = s.date_last_played
            FROM track_statistics AS s
            WHERE s.safe_path = tracks.safe_path
            "#,
        )
        .execute(tx.conn())
        .await?
        .rows_affected();

        sqlx::query(
            "DELETE FROM track_statistics WHERE safe_path IN (SELECT safe_path FROM tracks)",
        )
        .execute(tx.conn())
        .await?;

        Ok(updated)
    }
}
