//! # Artwork Cache
//!
//! Content-addressed storage for album covers.
//!
//! Covers are normalized to JPEG, downscaled when either side exceeds
//! [`MAX_ARTWORK_DIMENSION`], and stored as `album-<sha256>.jpg` in the cache
//! directory. The SHA-256 of the stored bytes is the artwork id, so albums
//! sharing the same cover share one file.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MetadataError, Result};

/// Longest side, in pixels, of a cached cover.
pub const MAX_ARTWORK_DIMENSION: u32 = 1200;

const FILE_PREFIX: &str = "album-";
const FILE_EXTENSION: &str = "jpg";

/// Storage for resolved album covers.
#[async_trait]
pub trait ArtworkCache: Send + Sync {
    /// Store image bytes and return the artwork id.
    async fn store(&self, data: Bytes) -> Result<String>;

    /// Whether the cached file for `artwork_id` exists.
    async fn exists(&self, artwork_id: &str) -> bool;

    /// Delete the cached file. Returns `false` when it did not exist.
    async fn delete(&self, artwork_id: &str) -> Result<bool>;

    /// Ids of every cached file.
    async fn list_ids(&self) -> Result<Vec<String>>;
}

/// [`ArtworkCache`] writing one file per cover into a directory.
#[derive(Debug, Clone)]
pub struct FileArtworkCache {
    dir: PathBuf,
}

impl FileArtworkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the cached file for `artwork_id`.
    pub fn path_for(&self, artwork_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", FILE_PREFIX, artwork_id, FILE_EXTENSION))
    }

    fn id_from_file_name(name: &str) -> Option<&str> {
        name.strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_EXTENSION)?
            .strip_suffix('.')
            .filter(|id| !id.is_empty())
    }
}

#[async_trait]
impl ArtworkCache for FileArtworkCache {
    async fn store(&self, data: Bytes) -> Result<String> {
        let encoded = tokio::task::spawn_blocking(move || normalize_image(&data))
            .await
            .map_err(|e| MetadataError::ArtworkError(format!("Image task failed: {}", e)))??;

        let artwork_id = calculate_hash(&encoded);
        let path = self.path_for(&artwork_id);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(artwork_id = %artwork_id, "Artwork already cached");
            return Ok(artwork_id);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &encoded).await?;
        info!(
            artwork_id = %artwork_id,
            bytes = encoded.len(),
            "Stored album artwork"
        );

        Ok(artwork_id)
    }

    async fn exists(&self, artwork_id: &str) -> bool {
        tokio::fs::try_exists(self.path_for(artwork_id))
            .await
            .unwrap_or(false)
    }

    async fn delete(&self, artwork_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(artwork_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = Self::id_from_file_name(&name.to_string_lossy()) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Decode, bound and re-encode a cover as JPEG.
///
/// Small JPEG input is stored as-is.
fn normalize_image(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| MetadataError::ImageError(format!("Failed to load image: {}", e)))?;

    let oversized = img.width() > MAX_ARTWORK_DIMENSION || img.height() > MAX_ARTWORK_DIMENSION;
    if !oversized && is_jpeg(data) {
        return Ok(data.to_vec());
    }

    let img = if oversized {
        img.resize(
            MAX_ARTWORK_DIMENSION,
            MAX_ARTWORK_DIMENSION,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .map_err(|e| MetadataError::ImageError(format!("Failed to encode image: {}", e)))?;
    Ok(buffer)
}

fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// SHA-256 of the data as lowercase hex.
fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
