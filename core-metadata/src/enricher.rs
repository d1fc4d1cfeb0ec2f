//! # Artwork Enricher
//!
//! Long-running background pass that resolves a cover for every album key
//! whose tracks are flagged `needs_album_artwork_indexing`.
//!
//! ## Passes
//!
//! 1. **From file**: the embedded picture of the album's most recently
//!    modified track.
//! 2. **From remote**: the [`RemoteArtworkLookup`] collaborator, for keys
//!    pass 1 could not resolve. Lookup failures count as "not found". With
//!    no remote collaborator this pass only clears the flags.
//!
//! A key's flag is cleared once one of the passes finishes with it, so a
//! completed run never leaves a flag set.
//!
//! ## Interruption
//!
//! Runs are coordinated through an [`ArtworkGate`]. At most one run is active;
//! [`ArtworkGate::request_stop`] makes the active run finish its current key,
//! flush its pending notification and exit. Keys not reached keep their flag
//! and are picked up by the next run.

use bytes::Bytes;
use core_library::models::split_multi;
use core_library::repositories::{AlbumArtworkRepository, TrackRepository};
use core_library::{AlbumArtwork, LibraryStore, Track};
use core_runtime::events::{CollectionEvent, CoreEvent, EventBus};
use core_runtime::logging::strip_path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::artwork::ArtworkCache;
use crate::error::{MetadataError, Result};
use crate::extractor::TagReader;
use crate::remote::{AlbumQuery, RemoteArtworkLookup};

/// Number of resolved keys per `AlbumArtworkAdded` notification.
pub const DEFAULT_NOTIFY_BATCH: usize = 20;

/// How often a waiter reports that the run has not stopped yet.
const STOP_WAIT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Current activity of the enricher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnricherState {
    Idle = 0,
    FromFile = 1,
    FromRemote = 2,
    Aborting = 3,
}

impl EnricherState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FromFile,
            2 => Self::FromRemote,
            3 => Self::Aborting,
            _ => Self::Idle,
        }
    }
}

/// Start/stop coordination for enrichment runs.
#[derive(Debug)]
pub struct ArtworkGate {
    may_run: AtomicBool,
    running: AtomicBool,
}

impl Default for ArtworkGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtworkGate {
    pub fn new() -> Self {
        Self {
            may_run: AtomicBool::new(true),
            running: AtomicBool::new(false),
        }
    }

    /// Permit new runs.
    pub fn allow(&self) {
        self.may_run.store(true, Ordering::SeqCst);
    }

    /// Ask the active run (if any) to stop and block new runs until [`allow`](Self::allow).
    pub fn request_stop(&self) {
        self.may_run.store(false, Ordering::SeqCst);
    }

    pub fn may_run(&self) -> bool {
        self.may_run.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the single run slot.
    ///
    /// Returns `None` when another run is active or runs are not permitted.
    pub fn try_start(self: &Arc<Self>) -> Option<GateRun> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let run = GateRun {
            gate: Arc::clone(self),
        };
        // Checked after claiming the slot: a stopper that saw `running == false`
        // has already cleared `may_run`, so this run backs out.
        if !self.may_run() {
            return None;
        }
        Some(run)
    }

    /// Wait until no run is active.
    ///
    /// There is no timeout; the run exits at its next key boundary.
    pub async fn wait_until_stopped(&self, poll: Duration) {
        let started = Instant::now();
        let mut last_warning = started;

        while self.is_running() {
            tokio::time::sleep(poll).await;
            if last_warning.elapsed() >= STOP_WAIT_WARN_INTERVAL {
                warn!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Still waiting for artwork enrichment to stop"
                );
                last_warning = Instant::now();
            }
        }
    }
}

/// Held by the active run; releases the slot on drop.
#[derive(Debug)]
pub struct GateRun {
    gate: Arc<ArtworkGate>,
}

impl Drop for GateRun {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::SeqCst);
    }
}

/// Counters for one enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub from_file: usize,
    pub from_remote: usize,
    pub not_found: usize,
    /// The run exited early because a stop was requested.
    pub aborted: bool,
}

impl EnrichmentSummary {
    pub fn resolved(&self) -> usize {
        self.from_file + self.from_remote
    }
}

/// Resolves album artwork for flagged tracks.
pub struct ArtworkEnricher {
    store: LibraryStore,
    cache: Arc<dyn ArtworkCache>,
    reader: Arc<dyn TagReader>,
    remote: Option<Arc<dyn RemoteArtworkLookup>>,
    events: EventBus,
    gate: Arc<ArtworkGate>,
    state: AtomicU8,
    notify_batch: usize,
}

/// Key left unresolved by pass 1, with the track representing its album.
struct Unresolved {
    album_key: String,
    track: Option<Track>,
}

impl ArtworkEnricher {
    pub fn new(
        store: LibraryStore,
        cache: Arc<dyn ArtworkCache>,
        reader: Arc<dyn TagReader>,
        events: EventBus,
        gate: Arc<ArtworkGate>,
    ) -> Self {
        Self {
            store,
            cache,
            reader,
            remote: None,
            events,
            gate,
            state: AtomicU8::new(EnricherState::Idle as u8),
            notify_batch: DEFAULT_NOTIFY_BATCH,
        }
    }

    /// Enable pass 2 lookups.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteArtworkLookup>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_notify_batch(mut self, notify_batch: usize) -> Self {
        self.notify_batch = notify_batch.max(1);
        self
    }

    pub fn gate(&self) -> &Arc<ArtworkGate> {
        &self.gate
    }

    pub fn cache(&self) -> &Arc<dyn ArtworkCache> {
        &self.cache
    }

    pub fn state(&self) -> EnricherState {
        EnricherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: EnricherState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Run both passes over every flagged album key.
    ///
    /// Returns immediately with an empty summary when another run is active
    /// or runs are currently not permitted.
    #[instrument(skip(self), fields(remote = self.remote.is_some()))]
    pub async fn run(&self) -> Result<EnrichmentSummary> {
        let Some(_run) = self.gate.try_start() else {
            debug!("Artwork enrichment not started: already running or stopped");
            return Ok(EnrichmentSummary::default());
        };

        let result = self.run_passes().await;
        self.set_state(EnricherState::Idle);

        match &result {
            Ok(summary) => info!(
                from_file = summary.from_file,
                from_remote = summary.from_remote,
                not_found = summary.not_found,
                aborted = summary.aborted,
                "Artwork enrichment finished"
            ),
            Err(e) => warn!(error = %e, "Artwork enrichment failed"),
        }
        result
    }

    async fn run_passes(&self) -> Result<EnrichmentSummary> {
        let tracks = self.store.tracks();
        let mut summary = EnrichmentSummary::default();
        let mut pending: Vec<String> = Vec::new();

        // Tracks without an album never get artwork
        let mut tx = self.store.begin_write().await?;
        let cleared = tracks.clear_artwork_flag(&mut tx, "").await?;
        tx.commit().await?;
        if cleared > 0 {
            debug!(cleared, "Cleared artwork flag for tracks without album");
        }

        let keys: Vec<String> = tracks
            .album_keys_needing_artwork()
            .await?
            .into_iter()
            .filter(|key| !key.is_empty())
            .collect();

        if keys.is_empty() {
            return Ok(summary);
        }
        info!(albums = keys.len(), "Phase 1: resolving artwork from files");

        self.set_state(EnricherState::FromFile);
        let mut unresolved = Vec::new();

        for album_key in keys {
            if !self.gate.may_run() {
                return Ok(self.abort(summary, pending));
            }

            let track = tracks.latest_for_album(&album_key).await?;
            let artwork_id = match &track {
                Some(track) => self.artwork_from_file(track).await,
                None => None,
            };

            let mut tx = self.store.begin_write().await?;
            self.store.album_artwork().delete(&mut tx, &album_key).await?;
            if let Some(artwork_id) = &artwork_id {
                self.persist(&mut tx, &album_key, artwork_id).await?;
            }
            tx.commit().await?;

            if artwork_id.is_some() {
                summary.from_file += 1;
                self.push_resolved(&mut pending, album_key);
            } else {
                unresolved.push(Unresolved { album_key, track });
            }
        }

        if unresolved.is_empty() {
            self.flush(&mut pending);
            return Ok(summary);
        }

        let Some(remote) = self.remote.clone() else {
            let mut tx = self.store.begin_write().await?;
            for item in &unresolved {
                tracks.clear_artwork_flag(&mut tx, &item.album_key).await?;
            }
            tx.commit().await?;

            summary.not_found = unresolved.len();
            self.flush(&mut pending);
            return Ok(summary);
        };

        info!(albums = unresolved.len(), "Phase 2: resolving artwork remotely");
        self.set_state(EnricherState::FromRemote);

        for item in unresolved {
            if !self.gate.may_run() {
                return Ok(self.abort(summary, pending));
            }

            let artwork_id = match &item.track {
                Some(track) => self.artwork_from_remote(remote.as_ref(), track).await,
                None => None,
            };

            let mut tx = self.store.begin_write().await?;
            match &artwork_id {
                Some(artwork_id) => self.persist(&mut tx, &item.album_key, artwork_id).await?,
                None => {
                    tracks.clear_artwork_flag(&mut tx, &item.album_key).await?;
                }
            }
            tx.commit().await?;

            if artwork_id.is_some() {
                summary.from_remote += 1;
                self.push_resolved(&mut pending, item.album_key);
            } else {
                summary.not_found += 1;
            }
        }

        self.flush(&mut pending);
        Ok(summary)
    }

    async fn persist(
        &self,
        tx: &mut core_library::WriteTransaction,
        album_key: &str,
        artwork_id: &str,
    ) -> Result<()> {
        let row = AlbumArtwork {
            album_key: album_key.to_string(),
            artwork_id: artwork_id.to_string(),
        };
        self.store.album_artwork().upsert(tx, &row).await?;
        self.store.tracks().clear_artwork_flag(tx, album_key).await?;
        Ok(())
    }

    async fn artwork_from_file(&self, track: &Track) -> Option<String> {
        let reader = Arc::clone(&self.reader);
        let path = PathBuf::from(&track.path);

        let embedded = tokio::task::spawn_blocking(move || reader.read_embedded_artwork(&path))
            .await
            .map_err(|e| MetadataError::ArtworkError(format!("Embedded artwork task failed: {}", e)))
            .and_then(|result| result);

        match embedded {
            Ok(Some(data)) => self.store_in_cache(&track.album_key, data).await,
            Ok(None) => None,
            Err(e) => {
                debug!(file = %strip_path(&track.path), error = %e, "No readable embedded artwork");
                None
            }
        }
    }

    async fn artwork_from_remote(
        &self,
        remote: &dyn RemoteArtworkLookup,
        track: &Track,
    ) -> Option<String> {
        let query = AlbumQuery {
            album_title: track.album_title.clone(),
            album_artists: split_multi(track.album_artists.as_deref()),
            track_title: track.track_title.clone(),
            artists: split_multi(track.artists.as_deref()),
        };

        match remote.fetch_album_art(&query).await {
            Ok(Some(data)) => self.store_in_cache(&track.album_key, data).await,
            Ok(None) => None,
            Err(e) => {
                warn!(album_key = %track.album_key, error = %e, "Remote artwork lookup failed");
                None
            }
        }
    }

    async fn store_in_cache(&self, album_key: &str, data: Bytes) -> Option<String> {
        match self.cache.store(data).await {
            Ok(artwork_id) => Some(artwork_id),
            Err(e) => {
                warn!(album_key = %album_key, error = %e, "Failed to cache artwork");
                None
            }
        }
    }

    fn push_resolved(&self, pending: &mut Vec<String>, album_key: String) {
        pending.push(album_key);
        if pending.len() >= self.notify_batch {
            self.flush(pending);
        }
    }

    fn flush(&self, pending: &mut Vec<String>) {
        if pending.is_empty() {
            return;
        }
        let album_keys = std::mem::take(pending);
        self.events
            .emit(CoreEvent::Collection(CollectionEvent::AlbumArtworkAdded {
                album_keys,
            }))
            .ok();
    }

    fn abort(&self, mut summary: EnrichmentSummary, mut pending: Vec<String>) -> EnrichmentSummary {
        info!("Artwork enrichment stop requested");
        self.set_state(EnricherState::Aborting);
        self.flush(&mut pending);
        summary.aborted = true;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_single_run() {
        let gate = Arc::new(ArtworkGate::new());

        let run = gate.try_start();
        assert!(run.is_some());
        assert!(gate.is_running());
        assert!(gate.try_start().is_none());

        drop(run);
        assert!(!gate.is_running());
        assert!(gate.try_start().is_some());
    }

    #[test]
    fn test_gate_stop_blocks_new_runs() {
        let gate = Arc::new(ArtworkGate::new());
        gate.request_stop();
        assert!(gate.try_start().is_none());

        gate.allow();
        assert!(gate.try_start().is_some());
    }

    #[test]
    fn test_gate_refused_start_releases_slot() {
        let gate = Arc::new(ArtworkGate::new());
        gate.request_stop();

        assert!(gate.try_start().is_none());
        assert!(!gate.is_running());
    }

    #[test]
    fn test_gate_no_run_starts_after_stopper_sees_idle() {
        use std::sync::atomic::AtomicBool;

        for _ in 0..2000 {
            let gate = Arc::new(ArtworkGate::new());
            let stopper_saw_idle = Arc::new(AtomicBool::new(false));

            let starter = {
                let gate = Arc::clone(&gate);
                let saw_idle = Arc::clone(&stopper_saw_idle);
                std::thread::spawn(move || match gate.try_start() {
                    // Still holding the slot, so the stopper cannot have seen it idle
                    Some(_run) => !saw_idle.load(Ordering::SeqCst),
                    None => true,
                })
            };

            gate.request_stop();
            while gate.is_running() {
                std::hint::spin_loop();
            }
            stopper_saw_idle.store(true, Ordering::SeqCst);

            assert!(starter.join().unwrap());
        }
    }

    #[tokio::test]
    async fn test_wait_until_stopped() {
        let gate = Arc::new(ArtworkGate::new());
        let run = gate.try_start().unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_until_stopped(Duration::from_millis(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(run);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            EnricherState::Idle,
            EnricherState::FromFile,
            EnricherState::FromRemote,
            EnricherState::Aborting,
        ] {
            assert_eq!(EnricherState::from_u8(state as u8), state);
        }
    }
}
