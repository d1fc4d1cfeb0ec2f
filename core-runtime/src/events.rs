//! # Event Bus System
//!
//! Typed notifications published by the indexing engine, delivered over
//! `tokio::sync::broadcast` so any number of observers (view-models, loggers,
//! tests) can react without the engine knowing about them.
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐    subscribe   ┌────────────┐
//! │ Orchestrator ├────────────>│           ├───────────────>│ Subscriber │
//! └──────────────┘             │ EventBus  │                └────────────┘
//! ┌──────────────┐    emit     │ (broadcast│    subscribe   ┌────────────┐
//! │   Enricher   ├────────────>│  channel) ├───────────────>│ Subscriber │
//! └──────────────┘             └───────────┘                └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CollectionEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Collection(CollectionEvent::RefreshLists))
//!     .ok();
//! ```
//!
//! Publishing with no subscribers returns an error; producers ignore it with
//! `.ok()` since notifications are fire-and-forget.
//!
//! Subscribers that fall behind by more than the buffer size receive
//! `RecvError::Lagged(n)` and can keep reading. `RecvError::Closed` means
//! every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events are emitted once per committed range, so bursts stay
/// small even for large collections.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation lifecycle and progress
    Indexing(IndexingEvent),
    /// Catalog contents changed and lists or artwork should be reloaded
    Collection(CollectionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Indexing(e) => e.description(),
            CoreEvent::Collection(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Indexing(IndexingEvent::Started)
            | CoreEvent::Indexing(IndexingEvent::Stopped) => EventSeverity::Info,
            CoreEvent::Collection(CollectionEvent::RefreshLists) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Indexing Events
// ============================================================================

/// Mutation phase reported by [`IndexingEvent::StatusChanged`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IndexingPhase {
    RemoveTracks,
    UpdateTracks,
    AddTracks,
}

impl fmt::Display for IndexingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexingPhase::RemoveTracks => "remove_tracks",
            IndexingPhase::UpdateTracks => "update_tracks",
            IndexingPhase::AddTracks => "add_tracks",
        };
        f.write_str(s)
    }
}

/// Events emitted while the catalog is being reconciled with disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum IndexingEvent {
    /// A full reconciliation began. Not emitted when the check decides to skip.
    Started,
    /// Progress after a committed batch.
    StatusChanged {
        /// Phase the batch belongs to.
        phase: IndexingPhase,
        /// Completion of the phase (0-100).
        percent: u8,
        /// Rows written so far in this phase.
        count: u64,
    },
    /// Reconciliation finished (successfully or not) and the engine is idle.
    Stopped,
}

impl IndexingEvent {
    fn description(&self) -> &str {
        match self {
            IndexingEvent::Started => "Indexing started",
            IndexingEvent::StatusChanged { .. } => "Indexing progress",
            IndexingEvent::Stopped => "Indexing stopped",
        }
    }
}

// ============================================================================
// Collection Events
// ============================================================================

/// Events telling observers which views of the catalog are stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CollectionEvent {
    /// Tracks or artwork rows changed; reload lists.
    RefreshLists,
    /// Artwork flags were reset; reload all artwork.
    RefreshArtwork,
    /// Artwork became available for these album keys.
    AlbumArtworkAdded {
        album_keys: Vec<String>,
    },
}

impl CollectionEvent {
    fn description(&self) -> &str {
        match self {
            CollectionEvent::RefreshLists => "Collection lists changed",
            CollectionEvent::RefreshArtwork => "Album artwork reset",
            CollectionEvent::AlbumArtworkAdded { .. } => "Album artwork added",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let indexing_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Indexing(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(phase: IndexingPhase, percent: u8, count: u64) -> CoreEvent {
        CoreEvent::Indexing(IndexingEvent::StatusChanged {
            phase,
            percent,
            count,
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Indexing(IndexingEvent::Started)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Collection(CollectionEvent::AlbumArtworkAdded {
            album_keys: vec!["abbey road|the beatles".to_string()],
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Collection(_)));

        bus.emit(progress(IndexingPhase::AddTracks, 50, 10)).ok();
        bus.emit(CoreEvent::Collection(CollectionEvent::RefreshLists))
            .ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(
            received,
            CoreEvent::Collection(CollectionEvent::RefreshLists)
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(progress(IndexingPhase::UpdateTracks, i * 20, i as u64))
                .ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity_and_description() {
        let started = CoreEvent::Indexing(IndexingEvent::Started);
        assert_eq!(started.severity(), EventSeverity::Info);
        assert_eq!(started.description(), "Indexing started");

        let tick = progress(IndexingPhase::RemoveTracks, 10, 1);
        assert_eq!(tick.severity(), EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(progress(IndexingPhase::AddTracks, i * 10, i as u64))
                    .ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for _ in 0..10 {
                bus2.emit(CoreEvent::Collection(CollectionEvent::RefreshArtwork))
                    .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization() {
        let event = progress(IndexingPhase::AddTracks, 100, 3);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Indexing\""));
        assert!(json.contains("\"event\":\"StatusChanged\""));
        assert!(json.contains("AddTracks"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
