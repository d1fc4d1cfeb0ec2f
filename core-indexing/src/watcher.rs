//! # Folder Watcher
//!
//! Watches collection folders and emits one debounced signal per burst of
//! file system changes.
//!
//! Raw `notify` events are forwarded from the OS watcher thread into an
//! unbounded tokio channel. A debounce task fires a signal once no relevant
//! event has arrived for the configured quiet period.
//!
//! Relevant means a change to a supported audio file or to a directory.
//! Access events and changes to other files (covers, playlists, notes) are
//! ignored. Watcher errors are logged and never propagate.

use crate::scanner::DiskScanner;
use notify::event::{CreateKind, RemoveKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ActiveWatch {
    // Dropping the OS watchers closes the raw event channel
    _watchers: Vec<RecommendedWatcher>,
    cancel: CancellationToken,
    debounce_task: JoinHandle<()>,
}

/// Debounced change notification for a set of folders.
pub struct FolderWatcher {
    debounce: Duration,
    filter: DiskScanner,
    signal_tx: mpsc::Sender<()>,
    active: Option<ActiveWatch>,
}

impl FolderWatcher {
    /// Create a stopped watcher and the receiver its signals arrive on.
    ///
    /// `filter` decides which file changes count.
    pub fn new(debounce: Duration, filter: DiskScanner) -> (Self, mpsc::Receiver<()>) {
        // One pending signal is enough: the refresh rescans everything
        let (signal_tx, signal_rx) = mpsc::channel(1);
        (
            Self {
                debounce,
                filter,
                signal_tx,
                active: None,
            },
            signal_rx,
        )
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start watching `roots` recursively, replacing any previous watch.
    ///
    /// Roots that cannot be watched are logged and skipped.
    pub fn start(&mut self, roots: &[PathBuf]) {
        self.stop();

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watchers = Vec::with_capacity(roots.len());

        for root in roots {
            let tx = raw_tx.clone();
            let watcher = RecommendedWatcher::new(
                move |result| {
                    // Unbounded send never blocks the OS watcher thread
                    tx.send(result).ok();
                },
                Config::default(),
            );

            match watcher.and_then(|mut w| w.watch(root, RecursiveMode::Recursive).map(|_| w)) {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => warn!(root = %root.display(), error = %e, "Failed to watch folder"),
            }
        }
        drop(raw_tx);

        let cancel = CancellationToken::new();
        let debounce_task = tokio::spawn(debounce_loop(
            raw_rx,
            self.signal_tx.clone(),
            self.filter.clone(),
            self.debounce,
            cancel.clone(),
        ));

        info!(roots = watchers.len(), "Folder watcher started");
        self.active = Some(ActiveWatch {
            _watchers: watchers,
            cancel,
            debounce_task,
        });
    }

    /// Stop watching. Pending debounced signals are discarded.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.debounce_task.abort();
            info!("Folder watcher stopped");
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_relevant(event: &Event, filter: &DiskScanner) -> bool {
    match event.kind {
        EventKind::Access(_) => false,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        // Overflow and rescan notices carry no paths
        _ if event.paths.is_empty() => true,
        _ => event
            .paths
            .iter()
            .any(|path| filter.is_supported(path) || looks_like_directory(path)),
    }
}

/// Removed or renamed directories can no longer be stat'ed; go by the name.
fn looks_like_directory(path: &Path) -> bool {
    path.extension().is_none()
}

async fn debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    signal_tx: mpsc::Sender<()>,
    filter: DiskScanner,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut dirty = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = raw_rx.recv() => match received {
                Some(Ok(event)) if is_relevant(&event, &filter) => {
                    debug!(kind = ?event.kind, paths = event.paths.len(), "File system change");
                    dirty = true;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(error = %e, "Folder watcher error"),
                None => break,
            },
            _ = tokio::time::sleep(debounce), if dirty => {
                dirty = false;
                // A full channel already holds a pending signal
                signal_tx.try_send(()).ok();
            }
        }
    }
}
