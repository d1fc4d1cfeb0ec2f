//! Integration tests for full collection refreshes

use bytes::Bytes;
use core_indexing::{
    CleanupSummary, IndexingConfig, IndexingOrchestrator, IndexingState, ReconciliationReport,
    RefreshOutcome,
};
use core_library::db::create_test_pool;
use core_library::repositories::{AlbumArtworkRepository, TrackRepository};
use core_library::LibraryStore;
use core_metadata::extractor::{LoftyTagReader, TagFields, TagReader};
use core_metadata::{ArtworkGate, FileArtworkCache, Result};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, IndexingEvent, IndexingPhase};
use mockall::mock;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

mock! {
    pub Reader {}
    impl TagReader for Reader {
        fn read(&self, path: &Path) -> Result<TagFields>;
        fn read_embedded_artwork(&self, path: &Path) -> Result<Option<Bytes>>;
    }
}

fn cover() -> Bytes {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        16,
        16,
        image::Rgb([200, 40, 40]),
    ));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buffer)
}

/// Reader tagging every file as part of one album, counting reads.
fn album_reader(reads: Arc<AtomicUsize>, with_cover: bool) -> MockReader {
    let mut reader = MockReader::new();
    reader.expect_read().returning(move |path| {
        reads.fetch_add(1, Ordering::SeqCst);
        Ok(TagFields {
            mime_type: Some("audio/mpeg".to_string()),
            title: path.file_stem().map(|s| s.to_string_lossy().to_string()),
            artists: vec!["Artist".to_string()],
            album_title: Some("Album".to_string()),
            album_artists: vec!["Artist".to_string()],
            ..TagFields::default()
        })
    });
    let image = cover();
    reader
        .expect_read_embedded_artwork()
        .returning(move |_| Ok(with_cover.then(|| image.clone())));
    reader
}

struct Fixture {
    music: TempDir,
    _cache: TempDir,
    store: LibraryStore,
    events: EventBus,
    reads: Arc<AtomicUsize>,
    orchestrator: IndexingOrchestrator,
}

impl Fixture {
    async fn new(config: IndexingConfig, with_cover: bool) -> Self {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let store = LibraryStore::new(create_test_pool().await.unwrap());
        let events = EventBus::default();
        let reads = Arc::new(AtomicUsize::new(0));

        let orchestrator = IndexingOrchestrator::new(
            config.with_max_workers(2),
            store.clone(),
            events.clone(),
            Arc::new(album_reader(Arc::clone(&reads), with_cover)),
            Arc::new(FileArtworkCache::new(cache.path())),
            None,
        )
        .unwrap();

        Self {
            music,
            _cache: cache,
            store,
            events,
            reads,
            orchestrator,
        }
    }

    async fn manual() -> Self {
        Self::new(
            IndexingConfig::default().with_refresh_collection_automatically(false),
            false,
        )
        .await
    }

    fn write(&self, relative: &str) -> PathBuf {
        let path = self.music.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not really audio").unwrap();
        path
    }

    async fn force(&self) -> ReconciliationReport {
        let outcome = self
            .orchestrator
            .refresh_collection_immediately()
            .expect("orchestrator busy")
            .await
            .unwrap();
        match outcome {
            RefreshOutcome::Reconciled(report) => report,
            other => panic!("expected reconciliation, got {:?}", other),
        }
    }
}

fn touch(path: &Path) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

fn drain(rx: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_three_new_files_are_added_and_linked() {
    let fixture = Fixture::manual().await;
    for name in ["a.mp3", "b.mp3", "sub/c.mp3"] {
        fixture.write(name);
    }
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();

    let mut rx = fixture.events.subscribe();
    let report = fixture.force().await;

    assert_eq!(report.added, 3);
    assert_eq!(report.linked, 3);
    assert_eq!(report.removed, 0);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 3);
    assert_eq!(fixture.store.tracks().folder_links().await.unwrap().len(), 3);

    let events = drain(&mut rx);
    assert!(events.contains(&CoreEvent::Indexing(IndexingEvent::StatusChanged {
        phase: IndexingPhase::AddTracks,
        percent: 100,
        count: 3,
    })));
    assert!(events.contains(&CoreEvent::Collection(CollectionEvent::RefreshLists)));
    assert_eq!(fixture.orchestrator.state(), IndexingState::Idle);
}

#[tokio::test]
async fn test_touched_file_updates_only_its_row() {
    let fixture = Fixture::manual().await;
    let first = fixture.write("first.mp3");
    fixture.write("second.mp3");
    fixture.write("third.mp3");
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture.force().await;
    assert_eq!(fixture.reads.load(Ordering::SeqCst), 3);

    touch(&first);
    let report = fixture.force().await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(fixture.reads.load(Ordering::SeqCst), 4);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_deleted_and_unmapped_files_are_removed() {
    let fixture = Fixture::manual().await;
    let doomed = fixture.write("doomed.mp3");
    fixture.write("kept.mp3");
    let folder = fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture.force().await;

    std::fs::remove_file(doomed).unwrap();
    let report = fixture.force().await;
    assert_eq!(report.removed, 1);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 1);

    // No folders left: every track goes, nothing comes back
    fixture.orchestrator.remove_folder(folder.id).await.unwrap();
    let report = fixture.force().await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.added, 0);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unchanged_collection_is_skipped_unless_forced() {
    let fixture = Fixture::new(IndexingConfig::default(), false).await;
    fixture.write("a.mp3");
    fixture.write("b.mp3");

    // Adding a folder schedules a refresh of its own
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture.orchestrator.wait_until_idle().await;
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 2);

    let outcome = fixture
        .orchestrator
        .refresh_collection()
        .unwrap()
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Skipped);

    let report = fixture.force().await;
    assert!(!report.modified());

    fixture.write("c.mp3");
    let outcome = fixture
        .orchestrator
        .refresh_collection()
        .unwrap()
        .await
        .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Reconciled(ref r) if r.added == 1));

    fixture.orchestrator.shutdown().await;
    assert!(fixture.orchestrator.refresh_collection().is_none());
}

#[tokio::test]
async fn test_overlapping_folders_insert_each_file_once() {
    let fixture = Fixture::manual().await;
    fixture.write("sub/shared.mp3");
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture
        .orchestrator
        .add_folder(fixture.music.path().join("sub"))
        .await
        .unwrap();

    let report = fixture.force().await;

    assert_eq!(report.added, 1);
    assert_eq!(report.linked, 2);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 1);
    assert_eq!(fixture.store.tracks().folder_links().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_tombstoned_files_stay_out() {
    let fixture = Fixture::manual().await;
    fixture.write("unwanted.mp3");
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture.force().await;

    let ids: Vec<i64> = fixture
        .store
        .tracks()
        .snapshot()
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(fixture.orchestrator.remove_tracks(&ids, true).await.unwrap(), 1);

    let report = fixture.force().await;
    assert_eq!(report.added, 0);
    assert_eq!(fixture.store.tracks().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_artwork_is_enriched_after_indexing_stops() {
    let fixture = Fixture::new(
        IndexingConfig::default().with_refresh_collection_automatically(false),
        true,
    )
    .await;
    fixture.write("01.mp3");
    fixture.write("02.mp3");
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();

    let mut rx = fixture.events.subscribe();
    fixture.force().await;
    fixture.orchestrator.wait_for_enrichment().await;

    let events = drain(&mut rx);
    let started = events
        .iter()
        .position(|e| *e == CoreEvent::Indexing(IndexingEvent::Started))
        .unwrap();
    let stopped = events
        .iter()
        .position(|e| *e == CoreEvent::Indexing(IndexingEvent::Stopped))
        .unwrap();
    let artwork = events
        .iter()
        .position(|e| {
            matches!(
                e,
                CoreEvent::Collection(CollectionEvent::AlbumArtworkAdded { .. })
            )
        })
        .unwrap();
    assert!(started < stopped);
    assert!(artwork > stopped);

    assert_eq!(fixture.store.album_artwork().list().await.unwrap().len(), 1);
    assert!(fixture
        .store
        .tracks()
        .album_keys_needing_artwork()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_rescan_album_artwork_reflags_and_resolves() {
    let fixture = Fixture::new(
        IndexingConfig::default().with_refresh_collection_automatically(false),
        true,
    )
    .await;
    fixture.write("01.mp3");
    fixture
        .orchestrator
        .add_folder(fixture.music.path())
        .await
        .unwrap();
    fixture.force().await;
    fixture.orchestrator.wait_for_enrichment().await;

    let mut rx = fixture.events.subscribe();
    let flagged = fixture
        .orchestrator
        .rescan_album_artwork(false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(flagged, 1);
    fixture.orchestrator.wait_for_enrichment().await;

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        CoreEvent::Collection(CollectionEvent::RefreshArtwork)
    );
    assert!(fixture
        .store
        .tracks()
        .album_keys_needing_artwork()
        .await
        .unwrap()
        .is_empty());
}

/// One second of 16-bit mono PCM silence.
fn write_wav(dir: &Path, name: &str) -> PathBuf {
    let sample_rate: u32 = 44_100;
    let data_len: u32 = sample_rate * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);

    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_real_files_with_lofty_reader() {
    let music = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    write_wav(music.path(), "Morning.wav");
    std::fs::write(music.path().join("broken.flac"), b"garbage").unwrap();
    std::fs::write(music.path().join("notes.txt"), b"ignored").unwrap();

    let store = LibraryStore::new(create_test_pool().await.unwrap());
    let orchestrator = IndexingOrchestrator::new(
        IndexingConfig::default().with_refresh_collection_automatically(false),
        store.clone(),
        EventBus::default(),
        Arc::new(LoftyTagReader::new()),
        Arc::new(FileArtworkCache::new(cache.path())),
        None,
    )
    .unwrap();
    orchestrator.add_folder(music.path()).await.unwrap();

    let outcome = orchestrator
        .refresh_collection_immediately()
        .unwrap()
        .await
        .unwrap();
    let RefreshOutcome::Reconciled(report) = outcome else {
        panic!("expected reconciliation");
    };
    assert_eq!(report.added, 2);
    assert_eq!(report.failed, 1);

    let mut tracks = store
        .tracks()
        .find_by_ids(&[1, 2])
        .await
        .unwrap();
    tracks.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    assert_eq!(tracks[0].file_name, "Morning.wav");
    assert!(tracks[0].indexing_success);
    assert_eq!(tracks[0].track_title.as_deref(), Some("Morning"));
    assert_eq!(tracks[1].file_name, "broken.flac");
    assert!(!tracks[1].indexing_success);
    assert!(!tracks[1].needs_indexing);
    assert!(tracks[1].indexing_failure_reason.is_some());

    // A failed file is not retried while it stays unchanged
    let outcome = orchestrator
        .refresh_collection_immediately()
        .unwrap()
        .await
        .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Reconciled(ref r) if r.updated == 0));
}

#[tokio::test]
async fn test_from_core_opens_catalog_at_database_path() {
    let data = TempDir::new().unwrap();
    let music = TempDir::new().unwrap();
    write_wav(music.path(), "Evening.wav");
    let database_path = data.path().join("db").join("collection.db");

    let core = CoreConfig::builder()
        .database_path(&database_path)
        .cache_dir(data.path().join("cache"))
        .refresh_collection_automatically(false)
        .build()
        .unwrap();
    let orchestrator = IndexingOrchestrator::from_core(&core, EventBus::default())
        .await
        .unwrap();
    orchestrator.add_folder(music.path()).await.unwrap();
    let outcome = orchestrator
        .refresh_collection_immediately()
        .unwrap()
        .await
        .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Reconciled(ref r) if r.added == 1));
    orchestrator.shutdown().await;
    assert!(database_path.exists());

    // The catalog survives a reopen
    let reopened = LibraryStore::open(&database_path).await.unwrap();
    assert_eq!(reopened.tracks().count().await.unwrap(), 1);
}

/// Reader taking `delay` per tag read.
fn slow_reader(reads: Arc<AtomicUsize>, delay: Duration) -> MockReader {
    let mut reader = MockReader::new();
    reader.expect_read().returning(move |_| {
        std::thread::sleep(delay);
        reads.fetch_add(1, Ordering::SeqCst);
        Ok(TagFields::default())
    });
    reader.expect_read_embedded_artwork().returning(|_| Ok(None));
    reader
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_add_phase_and_keeps_committed_rows() {
    let music = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    for i in 0..40 {
        std::fs::write(music.path().join(format!("{:02}.mp3", i)), b"x").unwrap();
    }

    let reads = Arc::new(AtomicUsize::new(0));
    let store = LibraryStore::new(create_test_pool().await.unwrap());
    let events = EventBus::default();
    let orchestrator = IndexingOrchestrator::new(
        IndexingConfig::default()
            .with_refresh_collection_automatically(false)
            .with_max_workers(2),
        store.clone(),
        events.clone(),
        Arc::new(slow_reader(Arc::clone(&reads), Duration::from_millis(10))),
        Arc::new(FileArtworkCache::new(cache.path())),
        None,
    )
    .unwrap();
    orchestrator.add_folder(music.path()).await.unwrap();

    let mut rx = events.subscribe();
    let run = orchestrator.refresh_collection_immediately().unwrap();
    wait_for(|| reads.load(Ordering::SeqCst) >= 5).await;
    orchestrator.shutdown().await;

    let RefreshOutcome::Reconciled(report) = run.await.unwrap() else {
        panic!("expected reconciliation");
    };
    let extracted = reads.load(Ordering::SeqCst);
    assert!(report.cancelled);
    assert!(extracted < 40);

    // Everything extracted before the stop was committed with its folder link
    assert_eq!(report.added as usize, extracted);
    assert_eq!(store.tracks().count().await.unwrap() as usize, extracted);
    assert_eq!(store.tracks().folder_links().await.unwrap().len(), extracted);

    // Cleanup never ran, but the run still reported its end
    assert_eq!(report.cleanup, CleanupSummary::default());
    let events = drain(&mut rx);
    assert!(events.contains(&CoreEvent::Indexing(IndexingEvent::Stopped)));
    assert!(events.contains(&CoreEvent::Collection(CollectionEvent::RefreshLists)));
    assert_eq!(orchestrator.state(), IndexingState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconciliation_waits_for_inflight_enrichment() {
    let music = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    std::fs::write(music.path().join("one.mp3"), b"x").unwrap();

    let enriching = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let gate: Arc<OnceLock<Arc<ArtworkGate>>> = Arc::new(OnceLock::new());

    let mut reader = MockReader::new();
    {
        let enriching = Arc::clone(&enriching);
        let overlaps = Arc::clone(&overlaps);
        let gate = Arc::clone(&gate);
        reader.expect_read().returning(move |_| {
            let gate_running = gate.get().is_some_and(|g| g.is_running());
            if enriching.load(Ordering::SeqCst) || gate_running {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            Ok(TagFields {
                album_title: Some("Album".to_string()),
                album_artists: vec!["Artist".to_string()],
                ..TagFields::default()
            })
        });
    }
    {
        let enriching = Arc::clone(&enriching);
        reader.expect_read_embedded_artwork().returning(move |_| {
            enriching.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            enriching.store(false, Ordering::SeqCst);
            Ok(None)
        });
    }

    let events = EventBus::default();
    let orchestrator = IndexingOrchestrator::new(
        IndexingConfig::default().with_refresh_collection_automatically(false),
        LibraryStore::new(create_test_pool().await.unwrap()),
        events.clone(),
        Arc::new(reader),
        Arc::new(FileArtworkCache::new(cache.path())),
        None,
    )
    .unwrap();
    gate.set(Arc::clone(orchestrator.artwork_gate())).unwrap();
    orchestrator.add_folder(music.path()).await.unwrap();

    orchestrator
        .refresh_collection_immediately()
        .unwrap()
        .await
        .unwrap();
    wait_for(|| enriching.load(Ordering::SeqCst)).await;

    // A new file forces a second reconciliation while the cover read is in flight
    std::fs::write(music.path().join("two.mp3"), b"x").unwrap();
    let mut rx = events.subscribe();
    let RefreshOutcome::Reconciled(report) = orchestrator
        .refresh_collection_immediately()
        .unwrap()
        .await
        .unwrap()
    else {
        panic!("expected reconciliation");
    };
    assert_eq!(report.added, 1);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert!(events.contains(&CoreEvent::Indexing(IndexingEvent::Started)));
    assert!(events.contains(&CoreEvent::Indexing(IndexingEvent::Stopped)));
}
