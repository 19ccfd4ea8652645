//! Directory identity tracking for alias and firmlink detection.

use std::collections::HashSet;

use dashmap::DashMap;

/// Tracks visited directories by `(device, inode)`.
///
/// Keyed per device so that a lookup only contends on one shard. Two paths
/// that resolve to the same directory (firmlinks, bind mounts) share an
/// identity, and only the first one to be tracked is traversed.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashMap<u64, HashSet<u64>>,
}

impl InodeTracker {
    /// Create a new inode tracker.
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Track an identity. Returns `true` if this is the first time seeing it.
    ///
    /// The check and the insert happen under one shard lock, so of two
    /// concurrent callers with the same identity exactly one wins.
    pub fn track(&self, device: u64, inode: u64) -> bool {
        self.seen.entry(device).or_default().insert(inode)
    }

    /// Check if an identity has been seen (without tracking).
    pub fn has_seen(&self, device: u64, inode: u64) -> bool {
        self.seen
            .get(&device)
            .is_some_and(|inodes| inodes.contains(&inode))
    }

    /// Record an identity as seen.
    pub fn mark_seen(&self, device: u64, inode: u64) {
        self.track(device, inode);
    }

    /// Number of unique identities tracked.
    pub fn len(&self) -> usize {
        self.seen.iter().map(|entry| entry.value().len()).sum()
    }

    /// Check if nothing has been tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.iter().all(|entry| entry.value().is_empty())
    }
}
