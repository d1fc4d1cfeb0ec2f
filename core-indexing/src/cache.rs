//! Safe-path lookup for the add phase.

use crate::error::Result;
use core_library::repositories::TrackRepository;
use core_library::LibraryStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// `safe_path -> track_id` map shared by the add workers.
///
/// Built once from the store after the remove phase and written through on
/// every insert. Workers probe it before extracting, then re-check under
/// the write lock before inserting, so a file seen through two overlapping
/// folders is inserted once.
#[derive(Debug, Clone, Default)]
pub struct IndexerCache {
    inner: Arc<RwLock<HashMap<String, i64>>>,
}

impl IndexerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn build(store: &LibraryStore) -> Result<Self> {
        let index: HashMap<String, i64> = store.tracks().safe_path_index().await?.into_iter().collect();
        debug!(entries = index.len(), "Indexer cache built");
        Ok(Self {
            inner: Arc::new(RwLock::new(index)),
        })
    }

    pub async fn get(&self, safe_path: &str) -> Option<i64> {
        self.inner.read().await.get(safe_path).copied()
    }

    pub async fn insert(&self, safe_path: String, track_id: i64) {
        self.inner.write().await.insert(safe_path, track_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
