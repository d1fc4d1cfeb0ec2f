//! # Reconciliation Planner
//!
//! Pure comparison of persisted catalog state against a fresh disk scan.
//!
//! Given the persisted track snapshot, the scan, the tombstones and the
//! `ignore_removed_files` policy, the planner partitions the universe into:
//!
//! - **remove**: rows with no folder mapping, or whose file is gone
//! - **update**: rows whose file changed on disk, or flagged `needs_indexing`
//! - **add**: disk paths with no row (and no tombstone, unless ignored)
//! - **unchanged**: every other persisted row
//!
//! Each persisted row lands in exactly one of remove/update/unchanged; add
//! only contains paths without a row. A persisted path missing from the
//! scan counts as deleted, so the scan doubles as the existence check.

use crate::scanner::DiskPathInfo;
use core_library::{FolderTrack, TrackSnapshot};
use std::collections::{HashMap, HashSet};

/// Inputs for the skip heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSummary {
    pub track_count: usize,
    pub any_needs_indexing: bool,
    pub max_date_file_modified: Option<i64>,
}

impl CatalogSummary {
    pub fn from_snapshot(snapshot: &[TrackSnapshot]) -> Self {
        Self {
            track_count: snapshot.len(),
            any_needs_indexing: snapshot.iter().any(|t| t.needs_indexing),
            max_date_file_modified: snapshot.iter().map(|t| t.date_file_modified).max(),
        }
    }
}

/// A persisted row whose file must be re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleTrack {
    pub track_id: i64,
    pub disk: DiskPathInfo,
}

/// What the mutator should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Track ids to delete
    pub remove: Vec<i64>,
    /// Rows to re-extract
    pub update: Vec<StaleTrack>,
    /// Disk entries with no row. A file found through several folders
    /// appears once per folder.
    pub add: Vec<DiskPathInfo>,
    /// Folder mappings missing for persisted tracks
    pub link: Vec<FolderTrack>,
    /// Number of persisted rows left alone
    pub unchanged: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.update.is_empty() && self.add.is_empty() && self.link.is_empty()
    }
}

/// Stateless planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationPlanner {
    ignore_removed_files: bool,
}

impl ReconciliationPlanner {
    pub fn new(ignore_removed_files: bool) -> Self {
        Self {
            ignore_removed_files,
        }
    }

    /// Cheap check deciding whether a full reconciliation is needed.
    ///
    /// Skips only when the counts match, no row needs indexing and the
    /// newest persisted modification time is not older than the newest on
    /// disk. A single max comparison: a file replaced by an older copy goes
    /// unnoticed until something else changes.
    pub fn needs_reconciliation(catalog: &CatalogSummary, disk: &[DiskPathInfo]) -> bool {
        let distinct_on_disk: HashSet<&str> = disk.iter().map(|d| d.safe_path.as_str()).collect();
        if catalog.track_count != distinct_on_disk.len() {
            return true;
        }
        if catalog.any_needs_indexing {
            return true;
        }

        let disk_max = disk.iter().map(|d| d.date_modified_ticks).max();
        match (catalog.max_date_file_modified, disk_max) {
            (Some(persisted), Some(on_disk)) => persisted < on_disk,
            (None, None) => false,
            _ => true,
        }
    }

    /// Partition persisted rows and disk paths.
    pub fn plan(
        &self,
        snapshot: &[TrackSnapshot],
        links: &[FolderTrack],
        disk: &[DiskPathInfo],
        tombstones: &HashSet<String>,
    ) -> ReconciliationPlan {
        // All disk entries per safe path; overlapping folders contribute several
        let mut on_disk: HashMap<&str, Vec<&DiskPathInfo>> = HashMap::new();
        for info in disk {
            on_disk.entry(info.safe_path.as_str()).or_default().push(info);
        }

        let existing_links: HashSet<(i64, i64)> =
            links.iter().map(|l| (l.folder_id, l.track_id)).collect();

        let mut plan = ReconciliationPlan::default();
        let mut persisted: HashSet<&str> = HashSet::with_capacity(snapshot.len());

        for track in snapshot {
            let Some(entries) = on_disk.get(track.safe_path.as_str()) else {
                plan.remove.push(track.id);
                continue;
            };
            if !track.has_folder {
                // Re-added below if a current folder still holds the file
                plan.remove.push(track.id);
                continue;
            }
            persisted.insert(track.safe_path.as_str());

            for entry in entries {
                if !existing_links.contains(&(entry.folder_id, track.id)) {
                    plan.link.push(FolderTrack {
                        folder_id: entry.folder_id,
                        track_id: track.id,
                    });
                }
            }

            let newest = entries.iter().map(|e| e.date_modified_ticks).max().unwrap_or(0);
            if track.needs_indexing || newest > track.date_file_modified {
                plan.update.push(StaleTrack {
                    track_id: track.id,
                    disk: entries[0].clone(),
                });
            } else {
                plan.unchanged += 1;
            }
        }

        // Duplicates of one new path are resolved by the indexer cache
        for info in disk {
            let key = info.safe_path.as_str();
            if persisted.contains(key) {
                continue;
            }
            if !self.ignore_removed_files && tombstones.contains(key) {
                continue;
            }
            plan.add.push(info.clone());
        }

        plan
    }

    /// Number of distinct safe paths in `plan.add`.
    pub fn distinct_adds(plan: &ReconciliationPlan) -> usize {
        plan.add
            .iter()
            .map(|a| a.safe_path.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn snapshot(id: i64, path: &str, modified: i64) -> TrackSnapshot {
        TrackSnapshot {
            id,
            path: path.to_string(),
            safe_path: path.to_lowercase(),
            date_file_modified: modified,
            needs_indexing: false,
            has_folder: true,
        }
    }

    fn disk(path: &str, folder_id: i64, modified: i64) -> DiskPathInfo {
        DiskPathInfo {
            path: PathBuf::from(path),
            safe_path: path.to_lowercase(),
            folder_id,
            date_modified_ticks: modified,
        }
    }

    fn link(folder_id: i64, track_id: i64) -> FolderTrack {
        FolderTrack {
            folder_id,
            track_id,
        }
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let mut flagged = snapshot(4, "/m/flagged.mp3", 100);
        flagged.needs_indexing = true;
        let mut orphan = snapshot(5, "/m/orphan.mp3", 100);
        orphan.has_folder = false;

        let rows = vec![
            snapshot(1, "/m/same.mp3", 100),
            snapshot(2, "/m/touched.mp3", 100),
            snapshot(3, "/m/deleted.mp3", 100),
            flagged,
            orphan,
        ];
        let links = vec![link(1, 1), link(1, 2), link(1, 3), link(1, 4)];
        let scan = vec![
            disk("/m/same.mp3", 1, 100),
            disk("/m/touched.mp3", 1, 200),
            disk("/m/flagged.mp3", 1, 100),
            disk("/m/orphan.mp3", 1, 100),
            disk("/m/new.mp3", 1, 300),
        ];

        let plan = ReconciliationPlanner::new(false).plan(&rows, &links, &scan, &HashSet::new());

        let mut remove = plan.remove.clone();
        remove.sort();
        assert_eq!(remove, vec![3, 5]);
        let updated: Vec<i64> = plan.update.iter().map(|u| u.track_id).collect();
        assert_eq!(updated, vec![2, 4]);
        assert_eq!(plan.unchanged, 1);
        // The orphaned row is rebuilt because its folder still holds the file
        let added: Vec<&str> = plan.add.iter().map(|a| a.safe_path.as_str()).collect();
        assert_eq!(added, vec!["/m/orphan.mp3", "/m/new.mp3"]);
        assert_eq!(plan.remove.len() + plan.update.len() + plan.unchanged, rows.len());
        assert!(plan.link.is_empty());
    }

    #[test]
    fn test_tombstones_block_adds_unless_ignored() {
        let scan = vec![disk("/m/removed.mp3", 1, 1)];
        let tombstones: HashSet<String> = ["/m/removed.mp3".to_string()].into();

        let plan = ReconciliationPlanner::new(false).plan(&[], &[], &scan, &tombstones);
        assert!(plan.add.is_empty());

        let plan = ReconciliationPlanner::new(true).plan(&[], &[], &scan, &tombstones);
        assert_eq!(plan.add.len(), 1);
    }

    #[test]
    fn test_overlapping_folders_link_missing_mappings() {
        let rows = vec![snapshot(1, "/m/sub/a.mp3", 10)];
        let links = vec![link(1, 1)];
        let scan = vec![
            disk("/m/sub/a.mp3", 1, 10),
            disk("/m/sub/a.mp3", 2, 10),
            disk("/m/sub/b.mp3", 1, 10),
            disk("/m/sub/b.mp3", 2, 10),
        ];

        let plan = ReconciliationPlanner::new(false).plan(&rows, &links, &scan, &HashSet::new());

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.link, vec![link(2, 1)]);
        assert_eq!(plan.add.len(), 2);
        assert_eq!(ReconciliationPlanner::distinct_adds(&plan), 1);
    }

    #[test]
    fn test_needs_reconciliation_skip_heuristic() {
        let rows = vec![snapshot(1, "/m/a.mp3", 100), snapshot(2, "/m/b.mp3", 200)];
        let summary = CatalogSummary::from_snapshot(&rows);
        let scan = vec![disk("/m/a.mp3", 1, 100), disk("/m/b.mp3", 1, 200)];

        assert!(!ReconciliationPlanner::needs_reconciliation(&summary, &scan));

        // Newer file on disk
        let touched = vec![disk("/m/a.mp3", 1, 100), disk("/m/b.mp3", 1, 250)];
        assert!(ReconciliationPlanner::needs_reconciliation(&summary, &touched));

        // Count mismatch
        assert!(ReconciliationPlanner::needs_reconciliation(&summary, &scan[..1]));

        // Flagged row
        let flagged = CatalogSummary {
            any_needs_indexing: true,
            ..summary
        };
        assert!(ReconciliationPlanner::needs_reconciliation(&flagged, &scan));
    }

    #[test]
    fn test_needs_reconciliation_with_no_folders() {
        let empty = CatalogSummary::from_snapshot(&[]);
        assert!(!ReconciliationPlanner::needs_reconciliation(&empty, &[]));

        let rows = vec![snapshot(1, "/m/a.mp3", 100)];
        let populated = CatalogSummary::from_snapshot(&rows);
        assert!(ReconciliationPlanner::needs_reconciliation(&populated, &[]));
    }

    #[test]
    fn test_no_folders_removes_everything() {
        let rows = vec![snapshot(1, "/m/a.mp3", 100), snapshot(2, "/m/b.mp3", 100)];
        let plan = ReconciliationPlanner::new(false).plan(&rows, &[], &[], &HashSet::new());

        assert_eq!(plan.remove.len(), 2);
        assert!(plan.add.is_empty());
        assert!(plan.update.is_empty());
    }
}
