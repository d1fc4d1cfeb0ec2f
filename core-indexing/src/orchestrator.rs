//! # Indexing Orchestrator
//!
//! Owns the `Idle → Checking → Indexing → Idle` state machine and sequences a
//! reconciliation:
//!
//! 1. stop the artwork enricher and the folder watcher
//! 2. scan every collection folder and decide whether to reconcile
//! 3. remove, migrate legacy statistics, update, add
//! 4. clean up artwork rows and cached covers
//! 5. go idle, restart enrichment and the watcher
//!
//! Entry points return immediately. Work runs on spawned tasks, and a trigger
//! arriving while a check is in flight is dropped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_indexing::{IndexingConfig, IndexingOrchestrator};
//! use core_library::{db::create_test_pool, LibraryStore};
//! use core_metadata::{FileArtworkCache, LoftyTagReader};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LibraryStore::new(create_test_pool().await?);
//! let orchestrator = IndexingOrchestrator::new(
//!     IndexingConfig::default().with_refresh_collection_automatically(false),
//!     store,
//!     EventBus::default(),
//!     Arc::new(LoftyTagReader::new()),
//!     Arc::new(FileArtworkCache::new("/tmp/covers")),
//!     None,
//! )?;
//!
//! orchestrator.add_folder("/home/me/Music").await?;
//! if let Some(run) = orchestrator.refresh_collection_immediately() {
//!     let outcome = run.await?;
//!     println!("{:?}", outcome);
//! }
//! # Ok(())
//! # }
//! ```

use crate::cache::IndexerCache;
use crate::cleanup::{ArtworkCleanup, CleanupSummary};
use crate::config::IndexingConfig;
use crate::error::{IndexingError, Result};
use crate::mutator::ParallelMutator;
use crate::planner::{CatalogSummary, ReconciliationPlan, ReconciliationPlanner};
use crate::scanner::{DiskPathInfo, DiskScanner};
use crate::watcher::FolderWatcher;
use core_library::path::is_within;
use core_library::repositories::{
    FolderRepository, RemovedTrackRepository, TrackRepository, TrackStatisticRepository,
};
use core_library::{safe_path, Folder, LibraryStore, RemovedTrack, TrackSnapshot};
use core_metadata::{
    ArtworkCache, ArtworkEnricher, ArtworkGate, FileArtworkCache, LoftyTagReader,
    MetadataExtractor, RemoteArtworkLookup, TagReader,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, IndexingEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IndexingState {
    Idle = 0,
    /// Scanning disk and deciding whether to reconcile
    Checking = 1,
    /// Reconciliation phases running
    Indexing = 2,
}

impl IndexingState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => IndexingState::Checking,
            2 => IndexingState::Indexing,
            _ => IndexingState::Idle,
        }
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexingState::Idle => "idle",
            IndexingState::Checking => "checking",
            IndexingState::Indexing => "indexing",
        };
        f.write_str(s)
    }
}

/// Counts from one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub removed: u64,
    pub updated: u64,
    pub added: u64,
    pub linked: u64,
    /// Files whose tags could not be read
    pub failed: u64,
    pub statistics_migrated: u64,
    pub cleanup: CleanupSummary,
    pub cancelled: bool,
}

impl ReconciliationReport {
    /// Whether tracks or artwork rows changed.
    pub fn modified(&self) -> bool {
        self.removed > 0
            || self.updated > 0
            || self.added > 0
            || self.linked > 0
            || self.statistics_migrated > 0
            || self.cleanup.changed()
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The catalog matched the disk
    Skipped,
    Reconciled(ReconciliationReport),
    /// Logged orchestrator-level failure
    Failed(String),
}

/// Handle to a spawned check.
pub type RefreshHandle = JoinHandle<RefreshOutcome>;

/// Input gathered while checking.
struct CheckInput {
    snapshot: Vec<TrackSnapshot>,
    disk: Vec<DiskPathInfo>,
}

/// Resets the state to idle unless released first.
struct StateGuard<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn new(state: &'a AtomicU8) -> Self {
        Self { state, armed: true }
    }

    fn release(mut self) {
        self.state.store(IndexingState::Idle as u8, Ordering::SeqCst);
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(IndexingState::Idle as u8, Ordering::SeqCst);
        }
    }
}

struct Inner {
    config: IndexingConfig,
    store: LibraryStore,
    events: EventBus,
    scanner: DiskScanner,
    planner: ReconciliationPlanner,
    mutator: ParallelMutator,
    enricher: Arc<ArtworkEnricher>,
    cleanup: ArtworkCleanup,
    state: AtomicU8,
    folders_dirty: AtomicBool,
    watcher: Mutex<FolderWatcher>,
    signals: Mutex<Option<mpsc::Receiver<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    enrichment: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Coordinates scanning, reconciliation and artwork enrichment.
///
/// Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct IndexingOrchestrator {
    inner: Arc<Inner>,
}

impl IndexingOrchestrator {
    /// Create an orchestrator.
    ///
    /// `remote` is used only when `config.download_missing_artwork` is set.
    pub fn new(
        config: IndexingConfig,
        store: LibraryStore,
        events: EventBus,
        reader: Arc<dyn TagReader>,
        artwork_cache: Arc<dyn ArtworkCache>,
        remote: Option<Arc<dyn RemoteArtworkLookup>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut enricher = ArtworkEnricher::new(
            store.clone(),
            Arc::clone(&artwork_cache),
            Arc::clone(&reader),
            events.clone(),
            Arc::new(ArtworkGate::new()),
        )
        .with_notify_batch(config.artwork_notify_batch);

        match (config.download_missing_artwork, remote) {
            (true, Some(remote)) => enricher = enricher.with_remote(remote),
            (true, None) => warn!("Remote artwork requested but no lookup configured"),
            (false, _) => {}
        }

        let mutator = ParallelMutator::new(
            store.clone(),
            MetadataExtractor::new(reader),
            events.clone(),
            config.worker_count(),
        );
        let scanner = DiskScanner::new(&config.extensions);
        let (watcher, signals) = FolderWatcher::new(config.watcher_debounce, scanner.clone());

        info!(
            workers = mutator.workers(),
            auto_refresh = config.refresh_collection_automatically,
            remote_artwork = config.download_missing_artwork,
            "Indexing orchestrator created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                scanner,
                planner: ReconciliationPlanner::new(config.ignore_removed_files),
                cleanup: ArtworkCleanup::new(store.clone(), artwork_cache),
                enricher: Arc::new(enricher),
                mutator,
                config,
                store,
                events,
                state: AtomicU8::new(IndexingState::Idle as u8),
                folders_dirty: AtomicBool::new(false),
                watcher: Mutex::new(watcher),
                signals: Mutex::new(Some(signals)),
                listener: Mutex::new(None),
                enrichment: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Open the catalog at `core.database_path` and create an orchestrator
    /// with the default tag reader and cover cache.
    pub async fn from_core(core: &CoreConfig, events: EventBus) -> Result<Self> {
        let store = LibraryStore::open(&core.database_path).await?;
        Self::new(
            IndexingConfig::from_core(core),
            store,
            events,
            Arc::new(LoftyTagReader::new()),
            Arc::new(FileArtworkCache::new(core.artwork_cache_dir())),
            remote_lookup(core)?,
        )
    }

    pub fn state(&self) -> IndexingState {
        IndexingState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &LibraryStore {
        &self.inner.store
    }

    pub fn artwork_gate(&self) -> &Arc<ArtworkGate> {
        self.inner.enricher.gate()
    }

    fn set_state(&self, state: IndexingState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    /// Start listening for watcher signals and run the initial check.
    pub async fn start(&self) {
        if let Some(mut signals) = self.inner.signals.lock().await.take() {
            let this = self.clone();
            let shutdown = self.inner.shutdown.clone();
            let listener = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        signal = signals.recv() => match signal {
                            Some(()) => {
                                debug!("Folder change signal");
                                this.refresh_collection();
                            }
                            None => break,
                        },
                    }
                }
            });
            *self.inner.listener.lock().await = Some(listener);
        }

        if self.inner.config.refresh_collection_automatically {
            self.refresh_collection();
        } else {
            self.start_enrichment().await;
        }
    }

    /// Cancel the running check and stop background work.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.watcher.lock().await.stop();
        if let Some(listener) = self.inner.listener.lock().await.take() {
            listener.abort();
        }

        let gate = self.inner.enricher.gate();
        gate.request_stop();
        gate.wait_until_stopped(self.inner.config.artwork_poll_interval)
            .await;
        self.wait_until_idle().await;
        info!("Indexing orchestrator shut down");
    }

    /// Check the collection unless automatic refresh is disabled.
    pub fn refresh_collection(&self) -> Option<RefreshHandle> {
        if !self.inner.config.refresh_collection_automatically {
            debug!("Automatic refresh disabled");
            return None;
        }
        self.spawn_check(false)
    }

    /// Reconcile even when the catalog looks current.
    pub fn refresh_collection_immediately(&self) -> Option<RefreshHandle> {
        self.spawn_check(true)
    }

    /// The folder set changed; the next check reconciles unconditionally.
    pub fn on_folders_changed(&self) -> Option<RefreshHandle> {
        self.inner.folders_dirty.store(true, Ordering::SeqCst);
        self.refresh_collection()
    }

    /// Re-flag tracks for artwork indexing and restart enrichment.
    ///
    /// With `only_when_missing`, only albums without an artwork row are flagged.
    pub fn rescan_album_artwork(&self, only_when_missing: bool) -> JoinHandle<Result<u64>> {
        let this = self.clone();
        tokio::spawn(async move {
            let idle = this.state() == IndexingState::Idle;
            if idle {
                this.stop_enrichment().await;
            }

            let flagged = this.flag_artwork(only_when_missing).await;
            if flagged.is_ok() {
                this.inner
                    .events
                    .emit(CoreEvent::Collection(CollectionEvent::RefreshArtwork))
                    .ok();
            }

            // A running check restarts enrichment itself
            if idle && this.state() == IndexingState::Idle {
                this.start_enrichment().await;
            }
            flagged
        })
    }

    /// Add a collection folder and schedule a refresh.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn add_folder(&self, path: impl AsRef<Path>) -> Result<Folder> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(IndexingError::FolderNotFound(path.display().to_string()));
        }

        let folders = self.inner.store.folders();
        let mut folder = Folder::new(path.to_string_lossy());
        if folders.find_by_safe_path(&folder.safe_path).await?.is_some() {
            return Err(IndexingError::FolderExists(folder.path));
        }
        // Overlaps are allowed; shared files get one row linked to both folders
        for existing in folders.list().await? {
            if is_within(&folder.safe_path, &existing.safe_path)
                || is_within(&existing.safe_path, &folder.safe_path)
            {
                info!(overlaps = %existing.path, "Folder overlaps an existing collection folder");
            }
        }

        let mut tx = self.inner.store.begin_write().await?;
        folder.id = folders.insert(&mut tx, &folder).await?;
        tx.commit().await?;

        info!(folder_id = folder.id, "Folder added");
        self.on_folders_changed();
        Ok(folder)
    }

    /// Remove a collection folder and schedule a refresh.
    ///
    /// Tracks only that folder held are deleted by the next reconciliation.
    #[instrument(skip(self))]
    pub async fn remove_folder(&self, folder_id: i64) -> Result<()> {
        let mut tx = self.inner.store.begin_write().await?;
        let deleted = self.inner.store.folders().delete(&mut tx, folder_id).await?;
        if !deleted {
            return Err(IndexingError::FolderNotFound(folder_id.to_string()));
        }
        tx.commit().await?;

        info!("Folder removed");
        self.on_folders_changed();
        Ok(())
    }

    /// Delete tracks from the catalog.
    ///
    /// With `tombstone`, the files are remembered so later scans skip them
    /// (unless `ignore_removed_files` is set).
    #[instrument(skip(self, track_ids), fields(tracks = track_ids.len()))]
    pub async fn remove_tracks(&self, track_ids: &[i64], tombstone: bool) -> Result<u64> {
        let tracks = self.inner.store.tracks();
        let removed_tracks = self.inner.store.removed_tracks();
        let rows = tracks.find_by_ids(track_ids).await?;

        let mut removed = 0;
        let mut tx = self.inner.store.begin_write().await?;
        for row in rows {
            if !tracks.delete(&mut tx, row.id).await? {
                continue;
            }
            removed += 1;
            if tombstone {
                removed_tracks
                    .insert(&mut tx, &RemovedTrack::new(row.path))
                    .await?;
            }
        }
        tx.commit().await?;

        if removed > 0 {
            self.inner
                .events
                .emit(CoreEvent::Collection(CollectionEvent::RefreshLists))
                .ok();
        }
        info!(removed, tombstone, "Tracks removed by user");
        Ok(removed)
    }

    /// Forget a tombstone so the file is indexed again.
    pub async fn restore_removed_track(&self, path: &str) -> Result<bool> {
        let mut tx = self.inner.store.begin_write().await?;
        let restored = self
            .inner
            .store
            .removed_tracks()
            .delete_by_safe_path(&mut tx, &safe_path(path))
            .await?;
        tx.commit().await?;
        Ok(restored)
    }

    /// Wait until no check is in flight.
    pub async fn wait_until_idle(&self) {
        while self.state() != IndexingState::Idle {
            tokio::time::sleep(self.inner.config.artwork_poll_interval).await;
        }
    }

    /// Wait for the most recently started enrichment run to finish.
    pub async fn wait_for_enrichment(&self) {
        let handle = self.inner.enrichment.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Artwork enrichment task failed");
            }
        }
    }

    fn spawn_check(&self, force: bool) -> Option<RefreshHandle> {
        if self.inner.shutdown.is_cancelled() {
            return None;
        }

        let claimed = self.inner.state.compare_exchange(
            IndexingState::Idle as u8,
            IndexingState::Checking as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if claimed.is_err() {
            debug!(state = %self.state(), "Check already in flight, trigger dropped");
            return None;
        }

        let this = self.clone();
        Some(tokio::spawn(async move { this.check_and_index(force).await }))
    }

    #[instrument(skip(self))]
    async fn check_and_index(&self, force: bool) -> RefreshOutcome {
        let guard = StateGuard::new(&self.inner.state);
        let cancel = self.inner.shutdown.child_token();
        let mut started = false;

        self.stop_enrichment().await;
        self.inner.watcher.lock().await.stop();

        let result = match self.check(force).await {
            Ok(None) => {
                info!("Collection is up to date");
                Ok(RefreshOutcome::Skipped)
            }
            Ok(Some(input)) => {
                self.set_state(IndexingState::Indexing);
                self.inner
                    .events
                    .emit(CoreEvent::Indexing(IndexingEvent::Started))
                    .ok();
                started = true;
                self.reconcile(input, &cancel)
                    .await
                    .map(RefreshOutcome::Reconciled)
            }
            Err(e) => Err(e),
        };

        let outcome = result.unwrap_or_else(|e| {
            error!(error = %e, "Collection refresh failed");
            RefreshOutcome::Failed(e.to_string())
        });

        guard.release();
        if started {
            self.inner
                .events
                .emit(CoreEvent::Indexing(IndexingEvent::Stopped))
                .ok();
        }

        if !self.inner.shutdown.is_cancelled() {
            self.start_enrichment().await;
            if self.inner.config.refresh_collection_automatically {
                self.start_watcher().await;
            }
        }
        outcome
    }

    /// Scan and decide. `None` means the catalog is current.
    async fn check(&self, force: bool) -> Result<Option<CheckInput>> {
        let folders = self.inner.store.folders().list().await?;
        let disk = self.inner.scanner.scan(&folders).await?;
        let snapshot = self.inner.store.tracks().snapshot().await?;

        let dirty = self.inner.folders_dirty.swap(false, Ordering::SeqCst);
        let summary = CatalogSummary::from_snapshot(&snapshot);
        let needed = ReconciliationPlanner::needs_reconciliation(&summary, &disk);
        debug!(
            folders = folders.len(),
            on_disk = disk.len(),
            persisted = snapshot.len(),
            force,
            dirty,
            needed,
            "Collection checked"
        );

        if !force && !dirty && !needed {
            return Ok(None);
        }
        Ok(Some(CheckInput { snapshot, disk }))
    }

    #[instrument(skip(self, input, cancel), fields(persisted = input.snapshot.len(), on_disk = input.disk.len()))]
    async fn reconcile(
        &self,
        input: CheckInput,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationReport> {
        let links = self.inner.store.tracks().folder_links().await?;
        let tombstones: HashSet<String> = self
            .inner
            .store
            .removed_tracks()
            .list()
            .await?
            .into_iter()
            .map(|r| r.safe_path)
            .collect();

        let plan = self
            .inner
            .planner
            .plan(&input.snapshot, &links, &input.disk, &tombstones);
        info!(
            remove = plan.remove.len(),
            update = plan.update.len(),
            add = ReconciliationPlanner::distinct_adds(&plan),
            link = plan.link.len(),
            unchanged = plan.unchanged,
            "Reconciliation planned"
        );

        let mut report = ReconciliationReport::default();
        let result = self.run_phases(plan, cancel, &mut report).await;

        if report.modified() {
            self.inner
                .events
                .emit(CoreEvent::Collection(CollectionEvent::RefreshLists))
                .ok();
        }

        result.map(|()| {
            info!(
                removed = report.removed,
                updated = report.updated,
                added = report.added,
                failed = report.failed,
                cancelled = report.cancelled,
                "Reconciliation complete"
            );
            report
        })
    }

    async fn run_phases(
        &self,
        plan: ReconciliationPlan,
        cancel: &CancellationToken,
        report: &mut ReconciliationReport,
    ) -> Result<()> {
        let mutator = &self.inner.mutator;
        let ReconciliationPlan {
            remove,
            update,
            add,
            link,
            ..
        } = plan;

        info!("Phase 1: Removing tracks");
        let removed = mutator.remove_tracks(remove, cancel).await;
        report.removed = removed.changed;
        if removed.cancelled {
            report.cancelled = true;
            return Ok(());
        }

        info!("Phase 2: Migrating legacy statistics");
        match self.migrate_statistics().await {
            Ok(migrated) => report.statistics_migrated = migrated,
            Err(e) => warn!(error = %e, "Legacy statistics migration failed"),
        }

        info!("Phase 3: Updating tracks");
        let updated = mutator.update_tracks(update, cancel).await;
        report.updated = updated.changed;
        report.failed += updated.failed;
        if updated.cancelled {
            report.cancelled = true;
            return Ok(());
        }

        info!("Phase 4: Adding tracks");
        let cache = IndexerCache::build(&self.inner.store).await?;
        let added = mutator.add_tracks(add, link, &cache, cancel).await;
        report.added = added.changed;
        report.linked = added.linked;
        report.failed += added.failed;
        if added.cancelled {
            report.cancelled = true;
            return Ok(());
        }

        info!("Phase 5: Cleaning up artwork");
        report.cleanup = match self.inner.cleanup.run().await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Artwork cleanup failed");
                CleanupSummary::default()
            }
        };

        Ok(())
    }

    async fn migrate_statistics(&self) -> Result<u64> {
        let statistics = self.inner.store.track_statistics();
        if statistics.pending_count().await? == 0 {
            return Ok(0);
        }

        let mut tx = self.inner.store.begin_write().await?;
        let migrated = statistics.migrate_into_tracks(&mut tx).await?;
        tx.commit().await?;
        info!(migrated, "Legacy statistics migrated");
        Ok(migrated)
    }

    async fn flag_artwork(&self, only_when_missing: bool) -> Result<u64> {
        let mut tx = self.inner.store.begin_write().await?;
        let flagged = self
            .inner
            .store
            .tracks()
            .flag_artwork(&mut tx, only_when_missing)
            .await?;
        tx.commit().await?;
        info!(flagged, only_when_missing, "Tracks flagged for artwork rescan");
        Ok(flagged)
    }

    async fn stop_enrichment(&self) {
        let gate = self.inner.enricher.gate();
        gate.request_stop();
        gate.wait_until_stopped(self.inner.config.artwork_poll_interval)
            .await;
    }

    async fn start_enrichment(&self) {
        self.inner.enricher.gate().allow();
        let enricher = Arc::clone(&self.inner.enricher);
        let handle = tokio::spawn(async move {
            if let Err(e) = enricher.run().await {
                debug!(error = %e, "Background enrichment ended with an error");
            }
        });
        *self.inner.enrichment.lock().await = Some(handle);
    }

    async fn start_watcher(&self) {
        match self.inner.store.folders().list().await {
            Ok(folders) => {
                let roots: Vec<PathBuf> = folders.iter().map(|f| PathBuf::from(&f.path)).collect();
                self.inner.watcher.lock().await.start(&roots);
            }
            Err(e) => warn!(error = %e, "Cannot restart folder watcher"),
        }
    }
}

#[cfg(feature = "artwork-remote")]
fn remote_lookup(core: &CoreConfig) -> Result<Option<Arc<dyn RemoteArtworkLookup>>> {
    use core_metadata::providers::MusicBrainzArtworkLookup;

    if !core.remote_artwork_available() {
        return Ok(None);
    }
    let lookup = MusicBrainzArtworkLookup::new(&core.metadata_api_config)?;
    Ok(Some(Arc::new(lookup)))
}

#[cfg(not(feature = "artwork-remote"))]
fn remote_lookup(_core: &CoreConfig) -> Result<Option<Arc<dyn RemoteArtworkLookup>>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::db::create_test_pool;
    use core_library::Track;
    use core_metadata::TagFields;
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Reader {}
        impl TagReader for Reader {
            fn read(&self, path: &Path) -> core_metadata::Result<TagFields>;
            fn read_embedded_artwork(&self, path: &Path) -> core_metadata::Result<Option<bytes::Bytes>>;
        }
    }

    async fn orchestrator(dir: &TempDir) -> IndexingOrchestrator {
        let store = LibraryStore::new(create_test_pool().await.unwrap());
        let mut reader = MockReader::new();
        reader.expect_read().returning(|_| Ok(TagFields::default()));
        reader.expect_read_embedded_artwork().returning(|_| Ok(None));

        IndexingOrchestrator::new(
            IndexingConfig::default()
                .with_refresh_collection_automatically(false)
                .with_max_workers(2),
            store,
            EventBus::default(),
            Arc::new(reader),
            Arc::new(FileArtworkCache::new(dir.path().join("covers"))),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            IndexingState::Idle,
            IndexingState::Checking,
            IndexingState::Indexing,
        ] {
            assert_eq!(IndexingState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_state_guard_resets_unless_released() {
        let state = AtomicU8::new(IndexingState::Indexing as u8);
        {
            let _guard = StateGuard::new(&state);
        }
        assert_eq!(state.load(Ordering::SeqCst), IndexingState::Idle as u8);

        state.store(IndexingState::Checking as u8, Ordering::SeqCst);
        StateGuard::new(&state).release();
        assert_eq!(state.load(Ordering::SeqCst), IndexingState::Idle as u8);
    }

    #[tokio::test]
    async fn test_refresh_is_noop_without_auto_refresh() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir).await;

        assert!(orchestrator.refresh_collection().is_none());
        assert!(orchestrator.on_folders_changed().is_none());
        assert_eq!(orchestrator.state(), IndexingState::Idle);
    }

    #[tokio::test]
    async fn test_reentrant_trigger_is_dropped() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir).await;

        let first = orchestrator.refresh_collection_immediately().unwrap();
        assert!(orchestrator.refresh_collection_immediately().is_none());

        first.await.unwrap();
        orchestrator.wait_until_idle().await;
        assert!(orchestrator.refresh_collection_immediately().is_some());
    }

    #[tokio::test]
    async fn test_add_folder_rejects_duplicates_and_missing_paths() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir).await;

        let folder = orchestrator.add_folder(dir.path()).await.unwrap();
        assert!(folder.id > 0);
        assert!(matches!(
            orchestrator.add_folder(dir.path()).await,
            Err(IndexingError::FolderExists(_))
        ));
        assert!(matches!(
            orchestrator.add_folder(dir.path().join("missing")).await,
            Err(IndexingError::FolderNotFound(_))
        ));
        assert!(matches!(
            orchestrator.remove_folder(folder.id + 100).await,
            Err(IndexingError::FolderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_tracks_writes_tombstones() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir).await;
        let store = orchestrator.store().clone();

        let mut tx = store.begin_write().await.unwrap();
        let id = store
            .tracks()
            .insert(&mut tx, &Track::new("/Music/Gone.mp3"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(orchestrator.remove_tracks(&[id, 999], true).await.unwrap(), 1);
        assert_eq!(store.tracks().count().await.unwrap(), 0);
        let tombstones = store.removed_tracks().list().await.unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].safe_path, "/music/gone.mp3");

        assert!(orchestrator
            .restore_removed_track("/Music/Gone.mp3")
            .await
            .unwrap());
        assert!(store.removed_tracks().list().await.unwrap().is_empty());
    }
}
