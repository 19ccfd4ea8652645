//! File and directory node types.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::{CompactString, ToCompactString};
use serde::{Deserialize, Serialize};

/// Type tag for directories without an extension.
pub(crate) const DIRECTORY_TYPE: &str = "directory";
/// Type tag for files without an extension.
pub(crate) const NO_EXTENSION_TYPE: &str = "no-extension";

/// Unique identifier for a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new NodeId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Inode information for alias detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

/// Type of file system node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (never followed).
    Symlink,
    /// Other file types (sockets, devices, etc.).
    Other,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::Symlink)
    }
}

/// A single file or directory in the tree.
///
/// A node exclusively owns its children. The `parent` link is a plain id
/// and never keeps anything alive; resolve it with [`FileNode::find_by_id`]
/// on the tree root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    /// Unique identifier for this node.
    pub id: NodeId,

    /// Id of the owning directory, `None` for the scan root.
    pub parent: Option<NodeId>,

    /// Absolute, normalized path.
    pub path: PathBuf,

    /// File/directory name (last path component).
    pub name: CompactString,

    /// Node type.
    pub kind: NodeKind,

    /// Size in bytes of this entry alone. Always 0 for directories; use
    /// [`FileNode::total_size`] for the aggregate.
    pub size: u64,

    /// Last modification time.
    pub modified: SystemTime,

    /// Extension tag (".rs"), or "directory" / "no-extension".
    pub file_type: CompactString,

    /// Device and inode of the entry.
    pub inode: Option<InodeInfo>,

    /// Children in directory-listing order (directories only).
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Create a new file-like node (file, symlink, or other).
    pub fn new_file(id: NodeId, path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        Self::new(id, path.into(), NodeKind::File, size, modified)
    }

    /// Create a new directory node.
    pub fn new_directory(id: NodeId, path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self::new(id, path.into(), NodeKind::Directory, 0, modified)
    }

    /// Create a node of the given kind. Directories ignore `size`.
    pub fn new(id: NodeId, path: PathBuf, kind: NodeKind, size: u64, modified: SystemTime) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_compact_string())
            .unwrap_or_else(|| path.to_string_lossy().to_compact_string());
        let file_type = type_tag(&path, kind.is_dir());
        Self {
            id,
            parent: None,
            path,
            name,
            kind,
            size: if kind.is_dir() { 0 } else { size },
            modified,
            file_type,
            inode: None,
            children: Vec::new(),
        }
    }

    /// Attach inode info.
    pub fn with_inode(mut self, inode: InodeInfo) -> Self {
        self.inode = Some(inode);
        self
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Append a child, setting its parent link.
    ///
    /// Non-directories never receive children; the child is dropped and
    /// `false` returned.
    pub fn attach(&mut self, mut child: FileNode) -> bool {
        if !self.is_dir() {
            return false;
        }
        debug_assert!(
            self.children.iter().all(|c| c.path != child.path),
            "duplicate sibling path {}",
            child.path.display()
        );
        child.parent = Some(self.id);
        self.children.push(child);
        true
    }

    /// Recursive size: own size for files, sum of children for directories.
    pub fn total_size(&self) -> u64 {
        if !self.is_dir() {
            return self.size;
        }
        self.children.iter().map(FileNode::total_size).sum()
    }

    /// Number of non-directory entries in this subtree (1 for a file).
    pub fn file_count(&self) -> u64 {
        if !self.is_dir() {
            return 1;
        }
        self.children.iter().map(FileNode::file_count).sum()
    }

    /// Number of directories below this node (excluding itself).
    pub fn dir_count(&self) -> u64 {
        self.children
            .iter()
            .filter(|c| c.is_dir())
            .map(|c| c.dir_count() + 1)
            .sum()
    }

    /// Find a node by path in this subtree.
    pub fn find(&self, path: &Path) -> Option<&FileNode> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Find a node by id in this subtree.
    pub fn find_by_id(&self, id: NodeId) -> Option<&FileNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Resolve the parent of `node` within this subtree.
    pub fn parent_of(&self, node: &FileNode) -> Option<&FileNode> {
        node.parent.and_then(|id| self.find_by_id(id))
    }

    /// Remove the descendant at `path` and return it.
    ///
    /// The node itself cannot be detached from here; callers holding the
    /// root clear it instead.
    pub fn detach(&mut self, path: &Path) -> Option<FileNode> {
        if !path.starts_with(&self.path) || self.path == path {
            return None;
        }
        if let Some(pos) = self.children.iter().position(|c| c.path == path) {
            let mut removed = self.children.remove(pos);
            removed.parent = None;
            return Some(removed);
        }
        self.children
            .iter_mut()
            .filter(|c| c.is_dir() && path.starts_with(&c.path))
            .find_map(|c| c.detach(path))
    }

    /// Depth-first pre-order visit of this subtree. `depth` starts at 0.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a FileNode, u32)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: u32, visit: &mut impl FnMut(&'a FileNode, u32)) {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    /// Sort children by total size in descending order, recursively.
    pub fn sort_children_by_size(&mut self) {
        self.children
            .sort_by_cached_key(|c| std::cmp::Reverse(c.total_size()));
        for child in &mut self.children {
            child.sort_children_by_size();
        }
    }
}

/// Extension tag for a path: lowercase ".ext", or a sentinel.
fn type_tag(path: &Path, is_dir: bool) -> CompactString {
    match path.extension() {
        Some(ext) => {
            let mut tag = CompactString::const_new(".");
            tag.push_str(&ext.to_string_lossy().to_lowercase());
            tag
        }
        None if is_dir => CompactString::const_new(DIRECTORY_TYPE),
        None => CompactString::const_new(NO_EXTENSION_TYPE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        SystemTime::now()
    }

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert_eq!(id.0, 42);
    }

    #[test]
    fn test_file_node_creation() {
        let node = FileNode::new_file(NodeId::new(1), "/data/test.TXT", 1024, now());
        assert!(node.is_file());
        assert!(!node.is_dir());
        assert_eq!(node.size, 1024);
        assert_eq!(node.name.as_str(), "test.TXT");
        assert_eq!(node.file_type.as_str(), ".txt");
    }

    #[test]
    fn test_type_tag_sentinels() {
        let dir = FileNode::new_directory(NodeId::new(1), "/data/src", now());
        assert_eq!(dir.file_type.as_str(), "directory");
        let bundle = FileNode::new_directory(NodeId::new(2), "/Applications/Foo.app", now());
        assert_eq!(bundle.file_type.as_str(), ".app");
        let plain = FileNode::new_file(NodeId::new(3), "/data/Makefile", 1, now());
        assert_eq!(plain.file_type.as_str(), "no-extension");
    }

    #[test]
    fn test_directory_ignores_size() {
        let node = FileNode::new(
            NodeId::new(1),
            PathBuf::from("/d"),
            NodeKind::Directory,
            4096,
            now(),
        );
        assert_eq!(node.size, 0);
        assert_eq!(node.total_size(), 0);
    }

    #[test]
    fn test_attach_sets_parent() {
        let mut dir = FileNode::new_directory(NodeId::new(1), "/d", now());
        assert!(dir.attach(FileNode::new_file(NodeId::new(2), "/d/a", 3, now())));
        assert_eq!(dir.children[0].parent, Some(NodeId::new(1)));

        let mut file = FileNode::new_file(NodeId::new(3), "/f", 1, now());
        assert!(!file.attach(FileNode::new_file(NodeId::new(4), "/f/x", 1, now())));
        assert!(file.children.is_empty());
    }
}
