//! # Metadata Extractor
//!
//! Fills a [`Track`] row from the tags and audio properties of its file.
//!
//! Tag parsing sits behind the [`TagReader`] trait; [`LoftyTagReader`] is the
//! production implementation and supports ID3, Vorbis comments, MP4 atoms,
//! APE and RIFF INFO tags.
//!
//! Extraction is blocking. Callers on the async runtime run it inside
//! `tokio::task::spawn_blocking`.
//!
//! ```rust,ignore
//! let extractor = MetadataExtractor::new(Arc::new(LoftyTagReader::new()));
//! let track = extractor.fill_track(Track::new(&path), &path).into_track();
//! ```

use bytes::Bytes;
use core_library::models::{join_multi, MULTI_VALUE_SEPARATOR};
use core_library::Track;
use core_runtime::logging::strip_path;
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};

/// Tag and audio-property values read from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    pub mime_type: Option<String>,
    pub duration_ms: Option<i64>,
    pub bit_rate: Option<i64>,
    pub sample_rate: Option<i64>,

    pub title: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub album_title: Option<String>,
    pub album_artists: Vec<String>,
    pub track_number: Option<i64>,
    pub track_count: Option<i64>,
    pub disc_number: Option<i64>,
    pub disc_count: Option<i64>,
    pub year: Option<i64>,
    pub has_lyrics: bool,
}

/// Parser for audio file tags.
///
/// Implementations perform blocking file IO.
pub trait TagReader: Send + Sync {
    /// Read tags and audio properties from `path`.
    fn read(&self, path: &Path) -> Result<TagFields>;

    /// Read the front cover (or first picture) embedded in `path`.
    fn read_embedded_artwork(&self, path: &Path) -> Result<Option<Bytes>>;
}

/// [`TagReader`] backed by `lofty`.
#[derive(Debug, Clone)]
pub struct LoftyTagReader {
    parse_options: ParseOptions,
}

impl LoftyTagReader {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    fn open(&self, path: &Path) -> Result<lofty::file::TaggedFile> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()));
        }

        Probe::open(path)
            .map_err(|e| MetadataError::ExtractionFailed(format!("Failed to open file: {}", e)))?
            .options(self.parse_options)
            .guess_file_type()
            .map_err(|e| MetadataError::ExtractionFailed(format!("Failed to probe file: {}", e)))?
            .read()
            .map_err(|e| MetadataError::UnsupportedFormat(format!("Failed to parse file: {}", e)))
    }

    /// Values of a possibly multi-valued item, split on the storage separator.
    fn multi(tag: &Tag, key: &ItemKey) -> Vec<String> {
        tag.get_strings(key)
            .flat_map(|value| value.split(MULTI_VALUE_SEPARATOR))
            .map(normalize_text)
            .filter(|value| !value.is_empty())
            .collect()
    }

    fn non_empty(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
        value
            .map(|v| normalize_text(v.as_ref()))
            .filter(|v| !v.is_empty())
    }
}

impl Default for LoftyTagReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<TagFields> {
        let tagged_file = self.open(path)?;
        let properties = tagged_file.properties();

        let mut fields = TagFields {
            mime_type: file_type_to_mime_type(tagged_file.file_type()),
            duration_ms: Some(properties.duration().as_millis() as i64),
            bit_rate: properties.audio_bitrate().map(i64::from),
            sample_rate: properties.sample_rate().map(i64::from),
            ..TagFields::default()
        };

        // Primary tag first, falling back to whichever tag the file carries
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            debug!(file = %strip_path(&path.to_string_lossy()), "No tags found");
            return Ok(fields);
        };

        fields.title = Self::non_empty(tag.title());
        fields.album_title = Self::non_empty(tag.album());
        fields.artists = Self::multi(tag, &ItemKey::TrackArtist);
        fields.album_artists = Self::multi(tag, &ItemKey::AlbumArtist);
        fields.genres = Self::multi(tag, &ItemKey::Genre);
        fields.track_number = tag.track().map(i64::from);
        fields.track_count = tag.track_total().map(i64::from);
        fields.disc_number = tag.disk().map(i64::from);
        fields.disc_count = tag.disk_total().map(i64::from);
        fields.year = tag.year().map(i64::from);
        fields.has_lyrics = tag
            .get_string(&ItemKey::Lyrics)
            .is_some_and(|lyrics| !lyrics.trim().is_empty());

        Ok(fields)
    }

    fn read_embedded_artwork(&self, path: &Path) -> Result<Option<Bytes>> {
        let tagged_file = self.open(path)?;

        let picture = tagged_file.tags().iter().find_map(|tag| {
            let pictures = tag.pictures();
            pictures
                .iter()
                .find(|p| p.pic_type() == PictureType::CoverFront)
                .or_else(|| pictures.first())
        });

        Ok(picture
            .filter(|p| !p.data().is_empty())
            .map(|p| Bytes::copy_from_slice(p.data())))
    }
}

/// Result of filling one track.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Extracted(Track),
    /// The track is marked as failed and will not be retried on its own.
    Failed { track: Track, reason: String },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Extracted(_))
    }

    pub fn track(&self) -> &Track {
        match self {
            Self::Extracted(track) | Self::Failed { track, .. } => track,
        }
    }

    pub fn into_track(self) -> Track {
        match self {
            Self::Extracted(track) | Self::Failed { track, .. } => track,
        }
    }
}

/// Applies a [`TagReader`] to catalog rows.
#[derive(Clone)]
pub struct MetadataExtractor {
    reader: Arc<dyn TagReader>,
}

impl MetadataExtractor {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<dyn TagReader> {
        &self.reader
    }

    /// Fill `track` from the file at `path`.
    ///
    /// Touches no shared state. Identity, `date_added` and play statistics
    /// are carried over from the input row.
    pub fn fill_track(&self, track: Track, path: &Path) -> ExtractionOutcome {
        let metadata = std::fs::metadata(path).ok();

        match self.reader.read(path) {
            Ok(fields) => {
                let mut filled = track;
                apply_fields(&mut filled, fields, path);
                if let Some(metadata) = &metadata {
                    filled.file_size = metadata.len() as i64;
                    if let Some(ticks) = modified_ticks(metadata) {
                        filled.date_file_modified = ticks;
                    }
                }
                filled.needs_indexing = false;
                filled.needs_album_artwork_indexing = true;
                filled.indexing_success = true;
                filled.indexing_failure_reason = None;
                ExtractionOutcome::Extracted(filled)
            }
            Err(e) => {
                let reason = e.to_string();
                let path_text = path.to_string_lossy();
                warn!(file = %strip_path(&path_text), error = %reason, "Metadata extraction failed");

                let mut failed = track;
                if let Some(ticks) = metadata.as_ref().and_then(modified_ticks) {
                    failed.date_file_modified = ticks;
                }
                failed.needs_indexing = false;
                failed.indexing_success = false;
                failed.indexing_failure_reason = Some(reason.clone());
                ExtractionOutcome::Failed {
                    track: failed,
                    reason,
                }
            }
        }
    }
}

fn apply_fields(track: &mut Track, fields: TagFields, path: &Path) {
    track.mime_type = fields.mime_type;
    track.duration_ms = fields.duration_ms;
    track.bit_rate = fields.bit_rate;
    track.sample_rate = fields.sample_rate;

    // Fall back to the file name when the tags carry no title
    track.track_title = fields.title.or_else(|| {
        path.file_stem()
            .map(|stem| normalize_text(&stem.to_string_lossy()))
            .filter(|stem| !stem.is_empty())
    });
    track.artists = join_multi(&fields.artists);
    track.genres = join_multi(&fields.genres);
    track.album_title = fields.album_title;
    track.album_artists = join_multi(&fields.album_artists);
    track.track_number = fields.track_number;
    track.track_count = fields.track_count;
    track.disc_number = fields.disc_number;
    track.disc_count = fields.disc_count;
    track.year = fields.year;
    track.has_lyrics = fields.has_lyrics;
    track.refresh_album_key();
}

/// File modification time in Unix milliseconds.
pub fn modified_ticks(metadata: &Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()
        .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis())
}

/// Normalize text metadata
///
/// - Trims leading/trailing whitespace
/// - Normalizes consecutive whitespace to single space
/// - Removes null bytes and control characters
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn file_type_to_mime_type(file_type: lofty::file::FileType) -> Option<String> {
    use lofty::file::FileType;
    let mime = match file_type {
        FileType::Aac => "audio/aac",
        FileType::Aiff => "audio/aiff",
        FileType::Ape => "audio/ape",
        FileType::Flac => "audio/flac",
        FileType::Mpeg => "audio/mpeg",
        FileType::Mp4 => "audio/mp4",
        FileType::Mpc => "audio/musepack",
        FileType::Opus => "audio/opus",
        FileType::Vorbis => "audio/vorbis",
        FileType::Speex => "audio/speex",
        FileType::Wav => "audio/wav",
        FileType::WavPack => "audio/wavpack",
        _ => return None,
    };
    Some(mime.to_string())
}
