//! Scan configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default number of concurrent directory reads.
pub const DEFAULT_WORKERS: usize = 8;
/// Default per-directory read deadline in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
/// Default minimum time between progress flushes in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;
/// Default number of visited entries between forced progress flushes.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;
/// Default depth below which directories fan out concurrently.
pub const DEFAULT_PARALLEL_DEPTH: u32 = 2;

/// Configuration for scanning operations.
///
/// Together with the exclusion flags this is the scan's exclusion policy:
/// network/cloud volumes, filesystem boundaries, hidden entries and
/// name patterns.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Skip network mounts and cloud-synced directories.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_network: bool,

    /// Stay on the root's filesystem (like `du -x`).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub one_filesystem: bool,

    /// Maximum directory reads in flight at once.
    #[builder(default = "DEFAULT_WORKERS")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-directory read deadline in milliseconds.
    #[builder(default = "DEFAULT_READ_TIMEOUT_MS")]
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Minimum time between progress flushes in milliseconds.
    #[builder(default = "DEFAULT_PROGRESS_INTERVAL_MS")]
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Flush progress at least every this many visited entries.
    #[builder(default = "DEFAULT_PROGRESS_EVERY")]
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Directories at a depth below this fan out their subdirectories
    /// concurrently; deeper ones are walked sequentially. Root is depth 0.
    #[builder(default = "DEFAULT_PARALLEL_DEPTH")]
    #[serde(default = "default_parallel_depth")]
    pub parallel_depth: u32,

    /// Patterns to ignore, matched against entry names (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}

fn default_progress_every() -> u64 {
    DEFAULT_PROGRESS_EVERY
}

fn default_parallel_depth() -> u32 {
    DEFAULT_PARALLEL_DEPTH
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.workers == Some(0) {
            return Err("Worker count must be at least 1".to_string());
        }
        if self.read_timeout_ms == Some(0) {
            return Err("Read timeout must be greater than zero".to_string());
        }
        if self.progress_every == Some(0) {
            return Err("Progress entry interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a config with default options for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_network: true,
            one_filesystem: true,
            workers: DEFAULT_WORKERS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            progress_every: DEFAULT_PROGRESS_EVERY,
            parallel_depth: DEFAULT_PARALLEL_DEPTH,
            ignore_patterns: Vec::new(),
            include_hidden: true,
        }
    }

    /// Per-directory read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    /// Minimum time between progress flushes.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
