//! Integration tests for metadata extraction with the lofty reader

use core_library::Track;
use core_metadata::extractor::{LoftyTagReader, MetadataExtractor, TagReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

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
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
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

#[test]
fn test_untagged_wav_uses_file_stem() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "Field Recording.wav");

    let extractor = MetadataExtractor::new(Arc::new(LoftyTagReader::new()));
    let outcome = extractor.fill_track(Track::new(&path), &path);

    assert!(outcome.is_success(), "unexpected failure: {:?}", outcome);
    let track = outcome.into_track();
    assert_eq!(track.track_title.as_deref(), Some("Field Recording"));
    assert_eq!(track.mime_type.as_deref(), Some("audio/wav"));
    assert_eq!(track.sample_rate, Some(44_100));
    let duration = track.duration_ms.unwrap();
    assert!((990..=1010).contains(&duration), "duration {}", duration);
    assert_eq!(track.album_key, "");
}

#[test]
fn test_untagged_wav_has_no_embedded_artwork() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "plain.wav");

    let reader = LoftyTagReader::new();
    assert!(reader.read_embedded_artwork(&path).unwrap().is_none());
}

#[test]
fn test_corrupted_file_is_marked_failed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.mp3");
    std::fs::write(&path, b"This is not a valid audio file").unwrap();

    let extractor = MetadataExtractor::new(Arc::new(LoftyTagReader::new()));
    let track = extractor.fill_track(Track::new(&path), &path).into_track();

    assert!(!track.indexing_success);
    assert!(!track.needs_indexing);
    assert!(track.indexing_failure_reason.is_some());
}

#[test]
fn test_missing_file_is_marked_failed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.flac");

    let extractor = MetadataExtractor::new(Arc::new(LoftyTagReader::new()));
    let track = extractor.fill_track(Track::new(&path), &path).into_track();

    assert!(!track.indexing_success);
    assert!(track
        .indexing_failure_reason
        .as_deref()
        .unwrap()
        .contains("File not found"));
}
