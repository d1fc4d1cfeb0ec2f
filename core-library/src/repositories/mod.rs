//! # Repository Pattern Implementation
//!
//! Each table has a repository trait plus a SQLite implementation built on
//! `sqlx`. Queries take `&self` and read through the pool. Mutations take a
//! [`WriteTransaction`](crate::store::WriteTransaction), so batching and the
//! single-writer lock stay with the caller.
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - Media files with tags, indexing flags and play statistics
//! - `FolderRepository` - Collection roots and their folder/track links
//! - `RemovedTrackRepository` - Tombstones of user-removed files
//! - `AlbumArtworkRepository` - Resolved artwork per album key
//! - `TrackStatisticRepository` - Legacy statistics awaiting migration

pub mod album_artwork;
pub mod folder;
pub mod removed_track;
pub mod statistics;
pub mod track;

pub use album_artwork::{AlbumArtworkRepository, SqliteAlbumArtworkRepository};
pub use folder::{FolderRepository, SqliteFolderRepository};
pub use removed_track::{RemovedTrackRepository, SqliteRemovedTrackRepository};
pub use statistics::{SqliteTrackStatisticRepository, TrackStatisticRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
