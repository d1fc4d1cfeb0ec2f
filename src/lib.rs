//! Media collection indexer.
//!
//! Facade crate re-exporting the workspace crates so host applications can
//! depend on `media-indexer` alone and toggle optional features here
//! (e.g. `artwork-remote`) instead of wiring each crate individually.

pub use core_indexing as indexing;
pub use core_library as library;
pub use core_metadata as metadata;
pub use core_runtime as runtime;

pub use core_indexing::{IndexingConfig, IndexingOrchestrator, IndexingState};
pub use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, IndexingEvent};
