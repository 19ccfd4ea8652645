//! Core types for spaceforce.
//!
//! This crate provides the data structures shared by the scanner and its
//! consumers: the scan tree, the terminal scan outcome, scan configuration,
//! and error types.

mod config;
mod error;
mod node;
mod tree;

pub use config::{
    DEFAULT_PARALLEL_DEPTH, DEFAULT_PROGRESS_EVERY, DEFAULT_PROGRESS_INTERVAL_MS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_WORKERS, ScanConfig, ScanConfigBuilder,
};
pub use error::{ScanError, ScanWarning, SkipReason, SkipRecord, WarningKind};
pub use node::{FileNode, InodeInfo, NodeId, NodeKind};
pub use tree::{LARGEST_FILES_LIMIT, ScanOutcome, TreeStats, TypeStats};
