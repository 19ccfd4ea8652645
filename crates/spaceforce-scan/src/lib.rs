//! File system scanning engine for spaceforce.
//!
//! Walks a directory tree with a bounded number of concurrent directory
//! reads and builds the size tree defined in `spaceforce-core`.
//!
//! # Overview
//!
//! - **Bounded parallelism**: directories near the root fan out into tokio
//!   tasks; a semaphore caps in-flight listings.
//! - **Stall tolerance**: every listing has a deadline; a stuck read is
//!   abandoned and recorded as an error.
//! - **Exclusions**: network and cloud volumes, other filesystems, aliases
//!   of already-visited directories and cloud placeholders are skipped with
//!   a reason.
//! - **Progress**: throttled snapshots on a bounded channel that never
//!   blocks the scan.
//! - **Cancellation** via [`CancellationToken`].
//!
//! # Example
//!
//! ```rust,no_run
//! use spaceforce_scan::{CancellationToken, ScanConfig, Scanner, progress_channel};
//!
//! # async fn run() {
//! let config = ScanConfig::new("/path/to/scan");
//! let (tx, mut rx) = progress_channel();
//!
//! tokio::spawn(async move {
//!     while let Some(progress) = rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//!
//! let outcome = Scanner::new()
//!     .scan(&config, CancellationToken::new(), Some(tx))
//!     .await;
//! println!("Total size: {} bytes", outcome.total_size());
//! # }
//! ```

mod fs;
mod inode;
mod progress;
mod reader;
mod scanner;
mod volume;

pub use fs::{EntryStat, FileSystem, LocalFs, MountEntry, MountTable, normalize_path};
pub use inode::InodeTracker;
pub use progress::{
    PROGRESS_CHANNEL_SIZE, ProgressReceiver, ProgressSender, ScanProgress, progress_channel,
};
pub use reader::read_dir_with_timeout;
pub use scanner::Scanner;
pub use volume::{VolumeClassifier, is_cloud_placeholder};

pub use tokio_util::sync::CancellationToken;

// Re-export core types for convenience
pub use spaceforce_core::{
    FileNode, NodeId, NodeKind, ScanConfig, ScanError, ScanOutcome, ScanWarning, SkipReason,
    SkipRecord, TreeStats, WarningKind,
};
