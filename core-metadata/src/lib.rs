//! # Metadata & Artwork Module
//!
//! Extracts metadata from audio files and enriches the catalog with album artwork.
//!
//! ## Overview
//!
//! This module handles:
//! - Audio tag extraction (ID3, Vorbis, MP4, FLAC) into catalog rows
//! - Embedded artwork extraction
//! - A content-addressed cover cache on disk
//! - Remote artwork fetching (optional, feature-gated)
//! - The background artwork enrichment pass

pub mod artwork;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod providers;
pub mod remote;

pub use artwork::{ArtworkCache, FileArtworkCache};
pub use enricher::{ArtworkEnricher, ArtworkGate, EnricherState, EnrichmentSummary};
pub use error::{MetadataError, Result};
pub use extractor::{ExtractionOutcome, LoftyTagReader, MetadataExtractor, TagFields, TagReader};
pub use remote::{AlbumQuery, RemoteArtworkLookup};
