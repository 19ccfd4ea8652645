//! Network and cloud volume classification.

use std::path::{Path, PathBuf};

use spaceforce_core::SkipReason;

/// Filesystem types that are served over the network.
const NETWORK_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "smbfs",
    "smb3",
    "afpfs",
    "cifs",
    "webdav",
    "davfs",
    "fuse.sshfs",
    "ftp",
    "mtpfs",
];

/// Automounter roots whose children are network mounts.
const NETWORK_MOUNT_PREFIXES: &[&str] = &["/net", "/Network"];

/// Cloud-sync directories relative to the home directory. More specific
/// entries come first so they win the reason.
const CLOUD_DIRS: &[(&str, &str)] = &[
    ("Library/Mobile Documents/com~apple~CloudDocs", "iCloud Drive"),
    ("Library/Mobile Documents", "iCloud synced directory"),
    ("Library/CloudStorage", "Cloud storage"),
    ("Dropbox", "Dropbox"),
    ("Google Drive", "Google Drive"),
    ("OneDrive", "OneDrive"),
    ("Box", "Box"),
];

/// Check if a file name is a not-yet-downloaded iCloud placeholder
/// (`.name.icloud`).
pub fn is_cloud_placeholder(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".icloud")
}

/// Decides whether a path sits on a network or cloud-backed volume.
///
/// Classification is a pure function of the path and the filesystem type
/// of the mount holding it; the classifier holds no mutable state and is
/// shared freely between traversal tasks.
#[derive(Debug, Clone)]
pub struct VolumeClassifier {
    skip_network: bool,
    cloud_dirs: Vec<(PathBuf, &'static str)>,
}

impl VolumeClassifier {
    /// Create a classifier rooted at the current user's home directory.
    pub fn new(skip_network: bool) -> Self {
        Self::with_home(skip_network, dirs::home_dir().as_deref())
    }

    /// Create a classifier with an explicit home directory.
    pub fn with_home(skip_network: bool, home: Option<&Path>) -> Self {
        let cloud_dirs = home
            .map(|home| {
                CLOUD_DIRS
                    .iter()
                    .map(|(rel, reason)| (home.join(rel), *reason))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            skip_network,
            cloud_dirs,
        }
    }

    /// Whether classification is active at all.
    pub fn is_enabled(&self) -> bool {
        self.skip_network
    }

    /// Classify `path`. Returns the reason to skip it, or `None` if it
    /// should be scanned.
    pub fn classify(&self, path: &Path, fs_type: Option<&str>) -> Option<SkipReason> {
        if !self.skip_network {
            return None;
        }

        if let Some((_, provider)) = self.cloud_dirs.iter().find(|(dir, _)| path.starts_with(dir)) {
            return Some(SkipReason::CloudBacked {
                provider: (*provider).to_string(),
            });
        }

        let fs_type_lower = fs_type.map(str::to_ascii_lowercase);
        let fs_name = || fs_type.unwrap_or("unknown").to_string();

        if let Some(ref lower) = fs_type_lower {
            if NETWORK_FS_TYPES.contains(&lower.as_str()) {
                return Some(SkipReason::NetworkVolume { fs_type: fs_name() });
            }
        }

        let under_mount_root = NETWORK_MOUNT_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix) && path != Path::new(prefix));
        if under_mount_root {
            return Some(SkipReason::NetworkVolume { fs_type: fs_name() });
        }

        // Automounted shares under /Volumes report autofs.
        let under_volumes = path.starts_with("/Volumes") && path != Path::new("/Volumes");
        if under_volumes && fs_type_lower.as_deref() == Some("autofs") {
            return Some(SkipReason::NetworkVolume { fs_type: fs_name() });
        }

        None
    }
}
