//! # Library Store
//!
//! Owns the connection pool together with the single-writer lock.
//!
//! Reads go straight to the pool and may run concurrently. Every write goes
//! through a [`WriteTransaction`], which holds the [`WriteLock`] for its whole
//! lifetime. That way parallel indexing workers and the artwork enricher
//! never interleave their transactions.
//!
//! ```rust,ignore
//! let store = LibraryStore::new(pool);
//!
//! let mut tx = store.begin_write().await?;
//! store.tracks().insert(&mut tx, &track).await?;
//! tx.commit().await?;
//! ```
//!
//! Dropping a `WriteTransaction` without committing rolls it back and then
//! releases the lock.

use crate::db::{create_pool, DatabaseConfig};
use crate::repositories::{
    SqliteAlbumArtworkRepository, SqliteFolderRepository, SqliteRemovedTrackRepository,
    SqliteTrackRepository, SqliteTrackStatisticRepository,
};
use crate::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Coarse lock serializing all catalog writes.
#[derive(Debug, Clone, Default)]
pub struct WriteLock {
    inner: Arc<Mutex<()>>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Whether a writer currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// A database transaction that owns the write lock.
pub struct WriteTransaction {
    // Field order matters: the transaction rolls back before the lock is released.
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTransaction {
    /// Connection to execute statements on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        trace!("Write transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Pool plus write discipline, shared by every component touching the catalog.
#[derive(Debug, Clone)]
pub struct LibraryStore {
    pool: SqlitePool,
    write_lock: WriteLock,
}

impl LibraryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: WriteLock::new(),
        }
    }

    /// Open (or create) the catalog file at `database_path`.
    pub async fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pool = create_pool(DatabaseConfig::new(database_path)).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn write_lock(&self) -> &WriteLock {
        &self.write_lock
    }

    /// Wait for the write lock, then open a transaction.
    pub async fn begin_write(&self) -> Result<WriteTransaction> {
        let guard = self.write_lock.acquire().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTransaction { tx, _guard: guard })
    }

    pub fn tracks(&self) -> SqliteTrackRepository {
        SqliteTrackRepository::new(self.pool.clone())
    }

    pub fn folders(&self) -> SqliteFolderRepository {
        SqliteFolderRepository::new(self.pool.clone())
    }

    pub fn removed_tracks(&self) -> SqliteRemovedTrackRepository {
        SqliteRemovedTrackRepository::new(self.pool.clone())
    }

    pub fn album_artwork(&self) -> SqliteAlbumArtworkRepository {
        SqliteAlbumArtworkRepository::new(self.pool.clone())
    }

    pub fn track_statistics(&self) -> SqliteTrackStatisticRepository {
        SqliteTrackStatisticRepository::new(self.pool.clone())
    }
}
