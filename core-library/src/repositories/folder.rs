//! Folder repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Folder;
use crate::store::WriteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Folder repository interface for data access operations
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// All configured folders, ordered by ID
    async fn list(&self) -> Result<Vec<Folder>>;

    /// Find a folder by its ID
    async fn find_by_id(&self, id: i64) -> Result<Option<Folder>>;

    /// Find a folder by its canonical safe path
    async fn find_by_safe_path(&self, safe_path: &str) -> Result<Option<Folder>>;

    /// Insert a new folder and return its ID
    ///
    /// # Errors
    /// Returns error if:
    /// - A folder with the same safe path already exists
    /// - Folder validation fails
    async fn insert(&self, tx: &mut WriteTransaction, folder: &Folder) -> Result<i64>;

    /// Delete a folder by ID. Its folder/track links cascade.
    ///
    /// # Returns
    /// - `Ok(true)` if folder was deleted
    /// - `Ok(false)` if folder was not found
    async fn delete(&self, tx: &mut WriteTransaction, id: i64) -> Result<bool>;

    /// Toggle whether the folder's tracks are shown in the collection
    async fn set_show_in_collection(
        &self,
        tx: &mut WriteTransaction,
        id: i64,
        show: bool,
    ) -> Result<()>;
}

/// SQLite implementation of FolderRepository
pub struct SqliteFolderRepository {
    pool: SqlitePool,
}

impl SqliteFolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn validate_folder(folder: &Folder) -> Result<()> {
        folder.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "Folder".to_string(),
            message: msg,
        })
    }
}

#[async_trait]
impl FolderRepository for SqliteFolderRepository {
    async fn list(&self) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>("SELECT * FROM folders ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(folders)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>("SELECT * FROM folders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(folder)
    }

    async fn find_by_safe_path(&self, safe_path: &str) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>("SELECT * FROM folders WHERE safe_path = ?")
            .bind(safe_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(folder)
    }

    async fn insert(&self, tx: &mut WriteTransaction, folder: &Folder) -> Result<i64> {
        Self::validate_folder(folder)?;

        let result =
            sqlx::query("INSERT INTO folders (path, safe_path, show_in_collection) VALUES (?, ?, ?)")
                .bind(&folder.path)
                .bind(&folder.safe_path)
                .bind(folder.show_in_collection)
                .execute(tx.conn())
                .await?;
        Ok(result.last_insert_rowid())
    }

    async fn delete(&self, tx: &mut WriteTransaction, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_show_in_collection(
        &self,
        tx: &mut WriteTransaction,
        id: i64,
        show: bool,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE folders SET show_in_collection = ? WHERE id = ?")
            .bind(show)
            .bind(id)
            .execute(tx.conn())
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Folder".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
