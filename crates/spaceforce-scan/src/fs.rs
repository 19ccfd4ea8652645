//! File system access used by the scanner.
//!
//! The scanner never touches `std::fs` directly; it goes through the
//! [`FileSystem`] trait so that stat, listing and mount metadata can be
//! swapped for a test double.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use spaceforce_core::NodeKind;

/// Metadata for a single entry. Symlinks are reported as such, never
/// followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    /// Entry type.
    pub kind: NodeKind,
    /// Length in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Device ID.
    pub device: u64,
    /// Inode number.
    pub inode: u64,
}

impl EntryStat {
    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// `(device, inode)` pair, or `None` where the platform reports no
    /// inode numbers.
    pub fn identity(&self) -> Option<(u64, u64)> {
        (self.inode != 0).then_some((self.device, self.inode))
    }
}

/// Stat, listing and mount-metadata capability.
///
/// Implementations are shared between traversal tasks and blocking-pool
/// threads, and a stalled `read_dir` may outlive the scan that issued it.
pub trait FileSystem: Send + Sync + 'static {
    /// Read metadata for `path` without following symlinks.
    fn stat(&self, path: &Path) -> io::Result<EntryStat>;

    /// Read metadata for a scan root, following a symlink to its target.
    fn stat_root(&self, path: &Path) -> io::Result<EntryStat> {
        self.stat(path)
    }

    /// List the entry names of a directory, in the order the OS returns them.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;

    /// Filesystem type name of the mount holding `path` ("apfs", "nfs", ...).
    fn fs_type(&self, path: &Path) -> Option<String>;

    /// Estimated bytes in use under `root`, when cheaply known.
    fn usage_estimate(&self, _root: &Path) -> Option<u64> {
        None
    }
}

/// The real, local file system.
#[derive(Debug)]
pub struct LocalFs {
    #[cfg_attr(target_os = "macos", allow(dead_code))]
    mounts: MountTable,
}

impl LocalFs {
    /// Create a handle, snapshotting the mount table.
    pub fn new() -> Self {
        Self {
            mounts: MountTable::load(),
        }
    }

    /// Check whether `path` is the root of a mount.
    fn is_mount_point(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return true;
        };
        match (self.stat_root(path), self.stat(parent)) {
            (Ok(own), Ok(up)) => own.device != up.device,
            _ => false,
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<EntryStat> {
        std::fs::symlink_metadata(path).map(|metadata| entry_stat(&metadata))
    }

    fn stat_root(&self, path: &Path) -> io::Result<EntryStat> {
        std::fs::metadata(path).map(|metadata| entry_stat(&metadata))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect()
    }

    fn fs_type(&self, path: &Path) -> Option<String> {
        #[cfg(target_os = "macos")]
        {
            statfs_type_name(path)
        }
        #[cfg(not(target_os = "macos"))]
        {
            self.mounts.fs_type(path).map(str::to_owned)
        }
    }

    fn usage_estimate(&self, root: &Path) -> Option<u64> {
        if !self.is_mount_point(root) {
            return None;
        }
        used_bytes(root)
    }
}

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount point.
    pub mount_point: PathBuf,
    /// Filesystem type name.
    pub fs_type: String,
}

/// Snapshot of mounted filesystems, answering "which mount holds this
/// path" by longest mount-point prefix.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Build a table from explicit entries.
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Load the table for the running system. Empty where unsupported.
    pub fn load() -> Self {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/self/mounts") {
                Ok(content) => Self::parse(&content),
                Err(err) => {
                    tracing::debug!("cannot read /proc/self/mounts: {err}");
                    Self::default()
                }
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::default()
        }
    }

    /// Parse `/proc/mounts` formatted text.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let _device = parts.next()?;
                let mount_point = parts.next()?;
                let fs_type = parts.next()?;
                Some(MountEntry {
                    mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                    fs_type: fs_type.to_string(),
                })
            })
            .collect();
        Self { entries }
    }

    /// Filesystem type of the mount that contains `path`.
    ///
    /// Later entries win over earlier ones at the same mount point, matching
    /// stacking order.
    pub fn fs_type(&self, path: &Path) -> Option<&str> {
        let mut best: Option<(&MountEntry, usize)> = None;
        for entry in &self.entries {
            if !path.starts_with(&entry.mount_point) {
                continue;
            }
            let depth = entry.mount_point.components().count();
            if best.is_none_or(|(_, d)| depth >= d) {
                best = Some((entry, depth));
            }
        }
        best.map(|(entry, _)| entry.fs_type.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode the octal escapes (`\040` for space) used in `/proc/mounts`.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let escaped = bytes
                .get(i + 1..i + 4)
                .and_then(|digits| std::str::from_utf8(digits).ok())
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = escaped {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Make `path` absolute and fold `.` and `..` lexically.
pub fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

#[cfg(target_os = "macos")]
fn statfs_type_name(path: &Path) -> Option<String> {
    use std::ffi::{CStr, CString};
    use std::os::unix::ffi::OsStrExt;

    let c = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut s: libc::statfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statfs(c.as_ptr(), &mut s as *mut _) };
    if rc != 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(s.f_fstypename.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn used_bytes(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut s: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c.as_ptr(), &mut s as *mut _) };
    if rc != 0 {
        return None;
    }
    let frsize = s.f_frsize as u128;
    let total = (s.f_blocks as u128).saturating_mul(frsize);
    let free = (s.f_bfree as u128).saturating_mul(frsize);
    Some(total.saturating_sub(free).min(u64::MAX as u128) as u64)
}

#[cfg(not(unix))]
fn used_bytes(_path: &Path) -> Option<u64> {
    None
}

fn entry_stat(metadata: &std::fs::Metadata) -> EntryStat {
    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::File
    } else if file_type.is_symlink() {
        NodeKind::Symlink
    } else {
        NodeKind::Other
    };
    EntryStat {
        kind,
        size: metadata.len(),
        modified: metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
        device: get_dev(metadata),
        inode: get_ino(metadata),
    }
}

// Cross-platform metadata helpers

/// Get the device ID from metadata.
#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0 // Windows doesn't have device IDs in the same way
}

/// Get the inode number from metadata.
#[cfg(unix)]
fn get_ino(metadata: &std::fs::Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &std::fs::Metadata) -> u64 {
    0 // Windows doesn't have inodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PROC_MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid 0 0
server:/export /mnt/share nfs4 rw,vers=4.2 0 0
//nas/media /mnt/share/media cifs rw 0 0
/dev/sdb1 /media/My\\040Disk vfat rw 0 0
";

    #[test]
    fn test_mount_table_longest_prefix() {
        let table = MountTable::parse(PROC_MOUNTS);
        assert_eq!(table.len(), 5);
        assert_eq!(table.fs_type(Path::new("/home/user")), Some("ext4"));
        assert_eq!(table.fs_type(Path::new("/mnt/share/docs")), Some("nfs4"));
        assert_eq!(table.fs_type(Path::new("/mnt/share/media/a.mkv")), Some("cifs"));
        // Prefix match is per component, not per byte.
        assert_eq!(table.fs_type(Path::new("/mnt/shared")), Some("ext4"));
    }

    #[test]
    fn test_mount_table_unescapes_spaces() {
        let table = MountTable::parse(PROC_MOUNTS);
        assert_eq!(table.fs_type(Path::new("/media/My Disk/photo.jpg")), Some("vfat"));
    }

    #[test]
    fn test_empty_mount_table() {
        let table = MountTable::default();
        assert!(table.is_empty());
        assert_eq!(table.fs_type(Path::new("/")), None);
    }

    #[test]
    fn test_normalize_path() {
        let normalized = normalize_path(Path::new("/a/./b/../c")).unwrap();
        assert_eq!(normalized, PathBuf::from("/a/c"));

        let relative = normalize_path(Path::new("x/y")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("x/y"));
    }

    #[test]
    fn test_local_fs_stat_and_list() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "0123456789").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let local = LocalFs::new();
        let stat = local.stat(&temp.path().join("a.txt")).unwrap();
        assert_eq!(stat.kind, NodeKind::File);
        assert_eq!(stat.size, 10);
        assert!(local.stat(&temp.path().join("sub")).unwrap().is_dir());

        let mut names = local.read_dir(temp.path()).unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("a.txt"), OsString::from("sub")]);

        let missing = local.read_dir(&temp.path().join("nope")).unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_fs_does_not_follow_symlinks() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let local = LocalFs::new();
        let stat = local.stat(&temp.path().join("link")).unwrap();
        assert_eq!(stat.kind, NodeKind::Symlink);

        let root = local.stat_root(&temp.path().join("link")).unwrap();
        assert_eq!(root.kind, NodeKind::Directory);
    }
}
