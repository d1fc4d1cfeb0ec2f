//! Indexing configuration

use crate::error::{IndexingError, Result};
use core_runtime::config::CoreConfig;
use std::time::Duration;

/// Audio file extensions picked up by the disk scanner.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "wav", "wave", "wma", "aiff", "aif", "ape",
    "wv",
];

/// Indexing orchestrator configuration
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Watch folders and refresh when their contents change
    pub refresh_collection_automatically: bool,

    /// Re-add files that the user removed from the collection
    pub ignore_removed_files: bool,

    /// Query the remote artwork service for albums without embedded covers
    pub download_missing_artwork: bool,

    /// Quiet period after the last file system event before refreshing
    pub watcher_debounce: Duration,

    /// Poll interval while waiting for the artwork enricher to stop
    pub artwork_poll_interval: Duration,

    /// Resolved album keys per `AlbumArtworkAdded` notification
    pub artwork_notify_batch: usize,

    /// Worker pool size. `None` uses the available parallelism.
    pub max_workers: Option<usize>,

    /// Supported audio file extensions (lowercase, without dot)
    pub extensions: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            refresh_collection_automatically: true,
            ignore_removed_files: false,
            download_missing_artwork: false,
            watcher_debounce: Duration::from_secs(2),
            artwork_poll_interval: Duration::from_millis(100),
            artwork_notify_batch: 20,
            max_workers: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl IndexingConfig {
    /// Derive indexing settings from the host configuration.
    pub fn from_core(core: &CoreConfig) -> Self {
        Self {
            refresh_collection_automatically: core.features.refresh_collection_automatically,
            ignore_removed_files: core.features.ignore_removed_files,
            download_missing_artwork: core.remote_artwork_available(),
            ..Self::default()
        }
    }

    pub fn with_refresh_collection_automatically(mut self, enabled: bool) -> Self {
        self.refresh_collection_automatically = enabled;
        self
    }

    pub fn with_ignore_removed_files(mut self, enabled: bool) -> Self {
        self.ignore_removed_files = enabled;
        self
    }

    pub fn with_download_missing_artwork(mut self, enabled: bool) -> Self {
        self.download_missing_artwork = enabled;
        self
    }

    pub fn with_watcher_debounce(mut self, debounce: Duration) -> Self {
        self.watcher_debounce = debounce;
        self
    }

    pub fn with_artwork_poll_interval(mut self, interval: Duration) -> Self {
        self.artwork_poll_interval = interval;
        self
    }

    pub fn with_artwork_notify_batch(mut self, batch: usize) -> Self {
        self.artwork_notify_batch = batch;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Number of parallel workers used by the mutator.
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == Some(0) {
            return Err(IndexingError::Config(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.artwork_notify_batch == 0 {
            return Err(IndexingError::Config(
                "artwork_notify_batch must be greater than 0".to_string(),
            ));
        }
        if self.artwork_poll_interval.is_zero() {
            return Err(IndexingError::Config(
                "artwork_poll_interval must be greater than 0".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(IndexingError::Config(
                "At least one audio extension is required".to_string(),
            ));
        }
        Ok(())
    }
}
