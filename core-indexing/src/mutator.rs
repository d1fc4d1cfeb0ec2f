//! # Parallel Mutator
//!
//! Applies a [`ReconciliationPlan`] to the catalog in three phases (remove,
//! update, add).
//!
//! ## Ranges
//!
//! Each phase splits its work list into contiguous ranges (see
//! [`range_size`]) and runs them on a bounded pool: a `JoinSet` of tasks
//! gated by a `Semaphore` with one permit per worker. Metadata extraction
//! runs on `spawn_blocking`.
//!
//! ## Writes
//!
//! A range collects its results first and then writes them in a single
//! [`WriteTransaction`](core_library::WriteTransaction), which holds the
//! store's write lock until commit. Workers never read from the pool while
//! holding a transaction.
//!
//! ## Cancellation
//!
//! The `CancellationToken` is checked before each item. A cancelled range
//! still commits what it already extracted.
//!
//! ## Failures
//!
//! Extraction failures are recorded on the row. A range that fails to write
//! is logged and skipped; the phase reports what the other ranges did.

use crate::cache::IndexerCache;
use crate::error::{IndexingError, Result};
use crate::planner::StaleTrack;
use crate::scanner::DiskPathInfo;
use core_library::repositories::TrackRepository;
use core_library::{FolderTrack, LibraryStore, Track};
use core_metadata::MetadataExtractor;
use core_runtime::events::{CoreEvent, EventBus, IndexingEvent, IndexingPhase};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Smallest range handed to a worker.
pub const MIN_RANGE_SIZE: usize = 10;

/// Range size for `total` items over `workers` workers.
///
/// Larger inputs are split into more ranges per worker (1, 4, then 16) so
/// progress is reported more often and the pool stays balanced.
pub fn range_size(total: usize, workers: usize) -> usize {
    let tier = if total < 1_000 {
        1
    } else if total < 10_000 {
        4
    } else {
        16
    };
    total.div_ceil(workers.max(1) * tier).max(MIN_RANGE_SIZE)
}

/// Counters for one range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOutcome {
    /// Items looked at
    pub processed: u64,
    /// Rows deleted, updated or inserted
    pub changed: u64,
    /// Folder mappings inserted
    pub linked: u64,
    /// Extraction failures recorded on rows
    pub failed: u64,
    pub cancelled: bool,
}

/// Counters for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub processed: u64,
    pub changed: u64,
    pub linked: u64,
    pub failed: u64,
    /// Ranges whose write was lost to an error
    pub failed_ranges: u64,
    pub cancelled: bool,
}

impl PhaseOutcome {
    fn absorb(&mut self, range: RangeOutcome) {
        self.processed += range.processed;
        self.changed += range.changed;
        self.linked += range.linked;
        self.failed += range.failed;
        self.cancelled |= range.cancelled;
    }

    /// Whether the phase modified the catalog.
    pub fn modified(&self) -> bool {
        self.changed > 0 || self.linked > 0
    }
}

/// Running totals of one phase, updated as ranges complete.
///
/// Only the collecting loop touches it, so emitted percentages never go backwards.
struct Progress {
    phase: IndexingPhase,
    total: u64,
    processed: u64,
    changed: u64,
    events: EventBus,
}

impl Progress {
    fn record(&mut self, range: &RangeOutcome) {
        self.processed += range.processed;
        self.changed += range.changed;
        let percent = if self.total == 0 {
            100
        } else {
            ((self.processed * 100) / self.total).min(100) as u8
        };

        self.events
            .emit(CoreEvent::Indexing(IndexingEvent::StatusChanged {
                phase: self.phase,
                percent,
                count: self.changed,
            }))
            .ok();
    }
}

/// Work kept for the write step of an add range.
enum PendingAdd {
    Link { folder_id: i64, track_id: i64 },
    Insert { folder_id: i64, track: Box<Track> },
}

/// Executes reconciliation phases on a worker pool.
#[derive(Clone)]
pub struct ParallelMutator {
    store: LibraryStore,
    extractor: MetadataExtractor,
    events: EventBus,
    workers: usize,
}

impl ParallelMutator {
    pub fn new(
        store: LibraryStore,
        extractor: MetadataExtractor,
        events: EventBus,
        workers: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            events,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Delete orphaned rows in bulk, then the listed rows range by range.
    #[instrument(skip(self, track_ids, cancel), fields(tracks = track_ids.len()))]
    pub async fn remove_tracks(&self, track_ids: Vec<i64>, cancel: &CancellationToken) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();

        match self.delete_orphans().await {
            Ok(deleted) => {
                outcome.changed += deleted;
                if deleted > 0 {
                    info!(deleted, "Removed tracks without folder");
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to remove orphaned tracks");
                return outcome;
            }
        }

        let ranges = self
            .run_ranges(IndexingPhase::RemoveTracks, track_ids, cancel, |mutator, range, cancel| async move {
                mutator.remove_range(range, cancel).await
            })
            .await;

        outcome.processed += ranges.processed;
        outcome.changed += ranges.changed;
        outcome.failed_ranges += ranges.failed_ranges;
        outcome.cancelled |= ranges.cancelled;
        info!(removed = outcome.changed, "Remove phase complete");
        outcome
    }

    /// Re-extract stale rows.
    #[instrument(skip(self, stale, cancel), fields(tracks = stale.len()))]
    pub async fn update_tracks(&self, stale: Vec<StaleTrack>, cancel: &CancellationToken) -> PhaseOutcome {
        let outcome = self
            .run_ranges(IndexingPhase::UpdateTracks, stale, cancel, |mutator, range, cancel| async move {
                mutator.update_range(range, cancel).await
            })
            .await;

        info!(
            updated = outcome.changed,
            failed = outcome.failed,
            "Update phase complete"
        );
        outcome
    }

    /// Insert new files and missing folder mappings.
    #[instrument(skip(self, new_files, links, cache, cancel), fields(files = new_files.len(), links = links.len()))]
    pub async fn add_tracks(
        &self,
        new_files: Vec<DiskPathInfo>,
        links: Vec<FolderTrack>,
        cache: &IndexerCache,
        cancel: &CancellationToken,
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();

        if !links.is_empty() {
            match self.link_existing(&links).await {
                Ok(linked) => outcome.linked += linked,
                Err(e) => {
                    error!(error = %e, "Failed to link existing tracks");
                    outcome.failed_ranges += 1;
                }
            }
        }

        let cache = cache.clone();
        let ranges = self
            .run_ranges(IndexingPhase::AddTracks, new_files, cancel, move |mutator, range, cancel| {
                let cache = cache.clone();
                async move { mutator.add_range(range, cache, cancel).await }
            })
            .await;

        outcome.processed += ranges.processed;
        outcome.changed += ranges.changed;
        outcome.linked += ranges.linked;
        outcome.failed += ranges.failed;
        outcome.failed_ranges += ranges.failed_ranges;
        outcome.cancelled |= ranges.cancelled;
        info!(
            added = outcome.changed,
            linked = outcome.linked,
            failed = outcome.failed,
            "Add phase complete"
        );
        outcome
    }

    async fn run_ranges<T, F, Fut>(
        &self,
        phase: IndexingPhase,
        items: Vec<T>,
        cancel: &CancellationToken,
        work: F,
    ) -> PhaseOutcome
    where
        T: Send + 'static,
        F: Fn(ParallelMutator, Vec<T>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<RangeOutcome>> + Send + 'static,
    {
        let mut outcome = PhaseOutcome::default();
        if items.is_empty() {
            return outcome;
        }

        let size = range_size(items.len(), self.workers);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut progress = Progress {
            phase,
            total: items.len() as u64,
            processed: 0,
            changed: 0,
            events: self.events.clone(),
        };
        debug!(%phase, total = items.len(), range_size = size, workers = self.workers, "Starting phase");

        let mut set = JoinSet::new();
        let mut items = items.into_iter();
        loop {
            let range: Vec<T> = items.by_ref().take(size).collect();
            if range.is_empty() {
                break;
            }

            let range_work = work(self.clone(), range, cancel.clone());
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| IndexingError::Task(e.to_string()))?;
                range_work.await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(range)) => {
                    progress.record(&range);
                    outcome.absorb(range);
                }
                Ok(Err(e)) => {
                    error!(%phase, error = %e, "Range failed");
                    outcome.failed_ranges += 1;
                }
                Err(e) => {
                    error!(%phase, error = %e, "Range task panicked or was aborted");
                    outcome.failed_ranges += 1;
                }
            }
        }

        outcome
    }

    async fn delete_orphans(&self) -> Result<u64> {
        let mut tx = self.store.begin_write().await?;
        let deleted = self.store.tracks().delete_orphans(&mut tx).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn link_existing(&self, links: &[FolderTrack]) -> Result<u64> {
        let tracks = self.store.tracks();
        let mut tx = self.store.begin_write().await?;
        let mut linked = 0;
        for link in links {
            if tracks.link_folder(&mut tx, link.folder_id, link.track_id).await? {
                linked += 1;
            }
        }
        tx.commit().await?;
        Ok(linked)
    }

    async fn remove_range(&self, track_ids: Vec<i64>, cancel: CancellationToken) -> Result<RangeOutcome> {
        let tracks = self.store.tracks();
        let mut outcome = RangeOutcome::default();

        let mut tx = self.store.begin_write().await?;
        for id in track_ids {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.processed += 1;
            // Orphans are already gone after the bulk delete
            if tracks.delete(&mut tx, id).await? {
                outcome.changed += 1;
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_range(&self, stale: Vec<StaleTrack>, cancel: CancellationToken) -> Result<RangeOutcome> {
        let tracks = self.store.tracks();
        let mut outcome = RangeOutcome::default();

        let ids: Vec<i64> = stale.iter().map(|s| s.track_id).collect();
        let mut rows: HashMap<i64, Track> = tracks
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut filled = Vec::with_capacity(stale.len());
        for item in stale {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.processed += 1;

            let Some(track) = rows.remove(&item.track_id) else {
                warn!(track_id = item.track_id, "Stale track vanished before update");
                continue;
            };

            let extraction = self.extract(track, item.disk.path).await?;
            if !extraction.is_success() {
                outcome.failed += 1;
            }
            filled.push(extraction.into_track());
        }

        if filled.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.store.begin_write().await?;
        for track in &filled {
            tracks.update_metadata(&mut tx, track).await?;
        }
        tx.commit().await?;

        outcome.changed = filled.len() as u64;
        Ok(outcome)
    }

    async fn add_range(
        &self,
        files: Vec<DiskPathInfo>,
        cache: IndexerCache,
        cancel: CancellationToken,
    ) -> Result<RangeOutcome> {
        let tracks = self.store.tracks();
        let mut outcome = RangeOutcome::default();

        let mut pending = Vec::with_capacity(files.len());
        for info in files {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.processed += 1;

            if let Some(track_id) = cache.get(&info.safe_path).await {
                pending.push(PendingAdd::Link {
                    folder_id: info.folder_id,
                    track_id,
                });
                continue;
            }

            let extraction = self.extract(Track::new(&info.path), info.path).await?;
            if !extraction.is_success() {
                outcome.failed += 1;
            }
            pending.push(PendingAdd::Insert {
                folder_id: info.folder_id,
                track: Box::new(extraction.into_track()),
            });
        }

        if pending.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.store.begin_write().await?;
        for item in pending {
            match item {
                PendingAdd::Link {
                    folder_id,
                    track_id,
                } => {
                    if tracks.link_folder(&mut tx, folder_id, track_id).await? {
                        outcome.linked += 1;
                    }
                }
                PendingAdd::Insert { folder_id, track } => {
                    // Another range may have inserted the same file meanwhile
                    let track_id = match cache.get(&track.safe_path).await {
                        Some(existing) => existing,
                        None => {
                            let id = tracks.insert(&mut tx, &track).await?;
                            cache.insert(track.safe_path.clone(), id).await;
                            outcome.changed += 1;
                            id
                        }
                    };
                    if tracks.link_folder(&mut tx, folder_id, track_id).await? {
                        outcome.linked += 1;
                    }
                }
            }
        }
        tx.commit().await?;

        Ok(outcome)
    }

    async fn extract(&self, track: Track, path: PathBuf) -> Result<core_metadata::ExtractionOutcome> {
        let extractor = self.extractor.clone();
        let outcome = tokio::task::spawn_blocking(move || extractor.fill_track(track, &path)).await?;
        Ok(outcome)
    }
}
