//! # Collection Indexing Module
//!
//! Keeps the catalog in step with the collection folders on disk.
//!
//! ## Overview
//!
//! This module manages:
//! - Recursive disk scans of the configured folders
//! - Debounced change notification for those folders
//! - Planning which rows to remove, update and add
//! - Applying the plan on a bounded worker pool
//! - Artwork cleanup and the hand-off to background enrichment
//!
//! ## Components
//!
//! - **Disk Scanner** (`scanner`): walks folders for supported audio files
//! - **Folder Watcher** (`watcher`): `notify` events collapsed into one signal per burst
//! - **Reconciliation Planner** (`planner`): pure catalog/disk comparison
//! - **Parallel Mutator** (`mutator`): range-partitioned remove, update and add phases
//! - **Indexer Cache** (`cache`): safe-path lookup so overlapping folders insert once
//! - **Artwork Cleanup** (`cleanup`): prunes stale artwork rows and cached covers
//! - **Indexing Orchestrator** (`orchestrator`): the state machine tying it together

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod mutator;
pub mod orchestrator;
pub mod planner;
pub mod scanner;
pub mod watcher;

pub use cache::IndexerCache;
pub use cleanup::{ArtworkCleanup, CleanupSummary};
pub use config::{IndexingConfig, DEFAULT_EXTENSIONS};
pub use error::{IndexingError, Result};
pub use mutator::{range_size, ParallelMutator, PhaseOutcome, MIN_RANGE_SIZE};
pub use orchestrator::{
    IndexingOrchestrator, IndexingState, ReconciliationReport, RefreshHandle, RefreshOutcome,
};
pub use planner::{CatalogSummary, ReconciliationPlan, ReconciliationPlanner, StaleTrack};
pub use scanner::{DiskPathInfo, DiskScanner};
pub use watcher::FolderWatcher;
