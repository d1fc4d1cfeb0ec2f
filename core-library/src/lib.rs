//! # Library Management Module
//!
//! Owns the collection catalog database and the repositories over it.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema and migrations
//! - Domain models for tracks, folders, tombstones and album artwork
//! - Canonical safe-path keys
//! - The single-writer [`LibraryStore`] every mutation goes through

pub mod db;
pub mod error;
pub mod models;
pub mod path;
pub mod repositories;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{AlbumArtwork, Folder, FolderTrack, RemovedTrack, Track, TrackSnapshot};
pub use path::safe_path;
pub use store::{LibraryStore, WriteLock, WriteTransaction};
