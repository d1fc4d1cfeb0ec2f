//! # Disk Scanner
//!
//! Recursively enumerates collection folders for supported audio files.
//!
//! The walk is blocking and runs on `spawn_blocking`. Unreadable entries and
//! missing roots are logged and skipped; a scan never fails as a whole.

use crate::error::Result;
use core_library::{safe_path, Folder};
use core_metadata::extractor::modified_ticks;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// A supported file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskPathInfo {
    pub path: PathBuf,
    pub safe_path: String,
    /// Folder whose walk found the file
    pub folder_id: i64,
    /// Modification time in Unix milliseconds
    pub date_modified_ticks: i64,
}

/// Enumerates supported files under collection folders.
#[derive(Debug, Clone)]
pub struct DiskScanner {
    extensions: HashSet<String>,
}

impl DiskScanner {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Whether `path` has a supported extension (case-insensitive).
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Scan every folder. A file under overlapping folders is reported once per folder.
    #[instrument(skip(self, folders), fields(folders = folders.len()))]
    pub async fn scan(&self, folders: &[Folder]) -> Result<Vec<DiskPathInfo>> {
        if folders.is_empty() {
            return Ok(Vec::new());
        }

        let scanner = self.clone();
        let folders = folders.to_vec();
        let paths = tokio::task::spawn_blocking(move || {
            folders
                .iter()
                .flat_map(|folder| scanner.scan_folder(folder))
                .collect::<Vec<_>>()
        })
        .await?;

        info!(files = paths.len(), "Disk scan complete");
        Ok(paths)
    }

    fn scan_folder(&self, folder: &Folder) -> Vec<DiskPathInfo> {
        let root = Path::new(&folder.path);
        if !root.is_dir() {
            warn!(folder = %folder.path, "Collection folder is missing or not a directory");
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(folder = %folder.path, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                    continue;
                }
            };

            let path = entry.into_path();
            found.push(DiskPathInfo {
                safe_path: safe_path(&path.to_string_lossy()),
                path,
                folder_id: folder.id,
                date_modified_ticks: modified_ticks(&metadata).unwrap_or(0),
            });
        }

        debug!(folder = %folder.path, files = found.len(), "Folder scanned");
        found
    }
}
