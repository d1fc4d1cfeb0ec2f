//! # Catalog Database
//!
//! Opens the SQLite catalog and applies the embedded migrations.
//!
//! All writes are serialized by [`LibraryStore`](crate::LibraryStore), so the
//! pool only needs a handful of connections for concurrent reads. WAL mode
//! lets those reads proceed while a write transaction is open.
//!
//! ```rust,ignore
//! let pool = create_pool(DatabaseConfig::new("collection.db")).await?;
//! let store = LibraryStore::new(pool);
//! ```
//!
//! Tests use [`create_test_pool`], an in-memory catalog on one connection.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Connections opened against a catalog file.
const FILE_CONNECTIONS: u32 = 5;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the catalog
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path.as_ref().display()),
            max_connections: FILE_CONNECTIONS,
        }
    }

    /// In-memory catalog.
    ///
    /// Every connection to `:memory:` opens its own private database, so the
    /// pool is pinned to a single connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

/// Open a pool and bring the schema up to date.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.max_connections == 1 {
        // Closing the last in-memory connection discards the database
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await.map_err(|e| {
        warn!(database_url = %config.database_url, error = %e, "Failed to open catalog");
        LibraryError::Database(e)
    })?;

    run_migrations(&pool).await?;
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Catalog opened"
    );
    Ok(pool)
}

pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Apply the migrations embedded from `migrations/`.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        LibraryError::Migration(e.to_string())
    })
}
