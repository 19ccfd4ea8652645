//! Error, warning, and skip types for scanning operations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during scanning.
///
/// Only a failure on the scan root is fatal. Everything else is converted
/// into a [`ScanWarning`] and recorded on the outcome.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory listing did not return within the read deadline.
    #[error("Timeout reading directory (>{}ms): {path}", .after.as_millis())]
    Timeout { path: PathBuf, after: Duration },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Path the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::Io { path, .. }
            | Self::Timeout { path, .. } => Some(path),
            Self::InvalidConfig { .. } | Self::Other { .. } => None,
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Path vanished between listing and stat.
    NotFound,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Directory listing exceeded the read deadline.
    Timeout,
    /// A traversal task ended abnormally.
    TaskFailed,
    /// Scan options were rejected before traversal.
    InvalidConfig,
}

/// Non-fatal problem recorded during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Warning for a directory that could not be listed.
    pub fn read_error(path: impl Into<PathBuf>, error: &ScanError) -> Self {
        let path = path.into();
        let kind = match error {
            ScanError::Timeout { .. } => WarningKind::Timeout,
            ScanError::PermissionDenied { .. } => WarningKind::PermissionDenied,
            ScanError::NotFound { .. } => WarningKind::NotFound,
            _ => WarningKind::ReadError,
        };
        Self {
            message: format!("Cannot read directory: {error}"),
            path,
            kind,
        }
    }

    /// Warning for an entry whose metadata could not be read.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &ScanError) -> Self {
        let path = path.into();
        let kind = match error {
            ScanError::PermissionDenied { .. } => WarningKind::PermissionDenied,
            ScanError::NotFound { .. } => WarningKind::NotFound,
            _ => WarningKind::MetadataError,
        };
        Self {
            message: format!("Cannot stat: {error}"),
            path,
            kind,
        }
    }
}

impl From<&ScanError> for ScanWarning {
    fn from(error: &ScanError) -> Self {
        let path = error.path().map(Path::to_path_buf).unwrap_or_default();
        Self::read_error(path, error)
    }
}

/// Why a path was deliberately left out of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Path lives on a network filesystem.
    NetworkVolume { fs_type: String },
    /// Path lives under a cloud-sync directory.
    CloudBacked { provider: String },
    /// Directory already traversed through another path.
    Alias,
    /// Directory is on a different device than the scan root.
    DifferentFilesystem { device: u64 },
    /// Not-yet-downloaded cloud file.
    CloudPlaceholder,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkVolume { fs_type } => write!(f, "network volume ({fs_type})"),
            Self::CloudBacked { provider } => f.write_str(provider),
            Self::Alias => f.write_str("alias/firmlink"),
            Self::DifferentFilesystem { device } => {
                write!(f, "different filesystem (device {device})")
            }
            Self::CloudPlaceholder => f.write_str("cloud placeholder"),
        }
    }
}

/// A path excluded from traversal, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    /// Path that was skipped.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

impl SkipRecord {
    /// Create a new skip record.
    pub fn new(path: impl Into<PathBuf>, reason: SkipReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

impl fmt::Display for SkipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.reason)
    }
}
