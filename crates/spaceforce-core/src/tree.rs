//! Scan outcome container and statistics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::{ScanWarning, SkipRecord};
use crate::node::FileNode;

/// How many of the largest files [`TreeStats`] keeps.
pub const LARGEST_FILES_LIMIT: usize = 100;

/// Count and bytes for one file type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub file_count: u64,
    pub total_size: u64,
}

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size in bytes.
    pub total_size: u64,
    /// Total number of non-directory entries.
    pub total_files: u64,
    /// Total number of directories below the root.
    pub total_dirs: u64,
    /// Maximum depth reached (root = 0).
    pub max_depth: u32,
    /// Largest files (path, size), biggest first, at most
    /// [`LARGEST_FILES_LIMIT`].
    pub largest_files: Vec<(PathBuf, u64)>,
    /// Files and bytes per type tag (".txt", "no-extension", ...).
    pub type_breakdown: HashMap<CompactString, TypeStats>,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute stats for a finished tree.
    pub fn from_root(root: &FileNode) -> Self {
        let mut stats = Self::new();
        root.walk(&mut |node, depth| {
            if depth == 0 {
                return;
            }
            if node.is_dir() {
                stats.record_dir(depth);
            } else {
                stats.record_file(&node.path, &node.file_type, node.size, depth);
            }
        });
        stats
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, path: &Path, file_type: &str, size: u64, depth: u32) {
        self.total_files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);

        let by_type = self.type_breakdown.entry(file_type.into()).or_default();
        by_type.file_count += 1;
        by_type.total_size += size;

        // Equal sizes keep walk order.
        let full = self.largest_files.len() >= LARGEST_FILES_LIMIT;
        if full && self.largest_files.last().is_some_and(|(_, s)| size <= *s) {
            return;
        }
        let at = self.largest_files.partition_point(|(_, s)| *s >= size);
        self.largest_files.insert(at, (path.to_path_buf(), size));
        self.largest_files.truncate(LARGEST_FILES_LIMIT);
    }

    /// The single largest file, if any.
    pub fn largest_file(&self) -> Option<&(PathBuf, u64)> {
        self.largest_files.first()
    }

    /// Type tags ordered by total bytes, largest first.
    pub fn types_by_size(&self) -> Vec<(&str, TypeStats)> {
        let mut types: Vec<_> = self
            .type_breakdown
            .iter()
            .map(|(tag, stats)| (tag.as_str(), *stats))
            .collect();
        types.sort_by(|a, b| b.1.total_size.cmp(&a.1.total_size).then(a.0.cmp(b.0)));
        types
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// Terminal result of one scan invocation.
///
/// A scan never fails at the call site: a root that cannot be stat'ed yields
/// `root: None` with the cause in `errors`, and everything below the root is
/// recorded-and-continued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Root node of the tree, `None` if the root itself was inaccessible.
    pub root: Option<FileNode>,

    /// Root path that was scanned (absolute).
    pub root_path: PathBuf,

    /// `true` if every branch finished without cancellation.
    pub completed: bool,

    /// Non-fatal problems, in the order they were recorded.
    pub errors: Vec<ScanWarning>,

    /// Paths deliberately left out, with reasons.
    pub skipped: Vec<SkipRecord>,

    /// Number of cloud placeholder files passed over.
    pub placeholders_skipped: u64,

    /// Summary statistics.
    pub stats: TreeStats,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,
}

impl ScanOutcome {
    /// Outcome for a scan whose root could not be accessed.
    pub fn failed(root_path: impl Into<PathBuf>, error: ScanWarning, scan_duration: Duration) -> Self {
        Self {
            root: None,
            root_path: root_path.into(),
            completed: false,
            errors: vec![error],
            skipped: Vec::new(),
            placeholders_skipped: 0,
            stats: TreeStats::new(),
            scanned_at: SystemTime::now(),
            scan_duration,
        }
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.root.as_ref().map_or(0, FileNode::total_size)
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if there were any errors during scanning.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Remove the subtree at `path` after it was deleted on disk.
    ///
    /// Detaching the root path clears the whole tree. Stats are recomputed
    /// when something was removed.
    pub fn detach(&mut self, path: &Path) -> Option<FileNode> {
        let removed = if self.root.as_ref().is_some_and(|r| r.path == path) {
            self.root.take()
        } else {
            self.root.as_mut().and_then(|r| r.detach(path))
        };
        if removed.is_some() {
            self.stats = self.root.as_ref().map(TreeStats::from_root).unwrap_or_default();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_dirs, 0);
    }

    #[test]
    fn test_tree_stats_record_file() {
        let mut stats = TreeStats::new();

        stats.record_file(Path::new("/test/file.txt"), ".txt", 1024, 2);

        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size, 1024);
        assert_eq!(stats.max_depth, 2);
        assert!(stats.largest_file().is_some());
        assert_eq!(stats.type_breakdown[".txt"].file_count, 1);
    }

    #[test]
    fn test_largest_files_are_bounded() {
        let mut stats = TreeStats::new();
        for i in 0..(LARGEST_FILES_LIMIT as u64 + 50) {
            stats.record_file(&PathBuf::from(format!("/r/{i}")), ".bin", i, 1);
        }

        assert_eq!(stats.largest_files.len(), LARGEST_FILES_LIMIT);
        assert_eq!(stats.largest_files[0].1, LARGEST_FILES_LIMIT as u64 + 49);
        assert_eq!(stats.largest_files.last().unwrap().1, 50);
        assert!(stats.largest_files.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(stats.type_breakdown[".bin"].file_count, LARGEST_FILES_LIMIT as u64 + 50);
    }

    #[test]
    fn test_failed_outcome() {
        let outcome = ScanOutcome::failed(
            "/missing",
            ScanWarning::new("/missing", "gone", crate::WarningKind::NotFound),
            Duration::ZERO,
        );
        assert!(outcome.root.is_none());
        assert!(!outcome.completed);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.total_size(), 0);
    }

    #[test]
    fn test_detach_root_clears_tree() {
        let now = SystemTime::now();
        let mut root = FileNode::new_directory(NodeId::new(0), "/r", now);
        root.attach(FileNode::new_file(NodeId::new(1), "/r/a", 5, now));
        let mut outcome = ScanOutcome {
            stats: TreeStats::from_root(&root),
            root: Some(root),
            root_path: PathBuf::from("/r"),
            completed: true,
            errors: Vec::new(),
            skipped: Vec::new(),
            placeholders_skipped: 0,
            scanned_at: now,
            scan_duration: Duration::ZERO,
        };
        assert_eq!(outcome.total_files(), 1);

        let removed = outcome.detach(Path::new("/r")).unwrap();
        assert_eq!(removed.path, PathBuf::from("/r"));
        assert!(outcome.root.is_none());
        assert_eq!(outcome.total_files(), 0);
    }
}
