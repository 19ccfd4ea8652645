//! Bounded-parallel directory scanner.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spaceforce_core::{
    FileNode, InodeInfo, NodeId, ScanConfig, ScanError, ScanOutcome, ScanWarning, SkipReason,
    SkipRecord, TreeStats, WarningKind,
};

use crate::fs::{EntryStat, FileSystem, LocalFs, normalize_path};
use crate::inode::InodeTracker;
use crate::progress::{ProgressReporter, ProgressSender, Visited};
use crate::reader::read_dir_with_timeout;
use crate::volume::{VolumeClassifier, is_cloud_placeholder};

/// Scanner that walks a directory tree with a bounded number of
/// concurrent directory reads.
///
/// Directories near the root fan out into one task per subdirectory;
/// deeper ones are walked sequentially by the task that reached them.
/// Every listing passes through a shared semaphore, and the permit is
/// released as soon as the listing returns, so a task never holds a permit
/// while waiting on its children.
pub struct Scanner {
    fs: Arc<dyn FileSystem>,
}

impl Scanner {
    /// Create a scanner over the local file system.
    pub fn new() -> Self {
        Self::with_fs(Arc::new(LocalFs::new()))
    }

    /// Create a scanner over a custom file system.
    pub fn with_fs(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Scan the tree rooted at `config.root`.
    ///
    /// Never fails at the call site: a root that cannot be stat'ed yields an
    /// outcome with no tree and one error. The progress channel, if given,
    /// is closed when this returns.
    pub async fn scan(
        &self,
        config: &ScanConfig,
        cancel: CancellationToken,
        progress: Option<ProgressSender>,
    ) -> ScanOutcome {
        let start = Instant::now();
        let scanned_at = SystemTime::now();

        let root_path = match normalize_path(&config.root) {
            Ok(path) => path,
            Err(err) => {
                let err = ScanError::io(&config.root, err);
                return root_failure(&config.root, ScanWarning::metadata_error(&config.root, &err), start);
            }
        };

        let ignore = match compile_ignore(&config.ignore_patterns) {
            Ok(set) => set,
            Err(err) => {
                let warning = ScanWarning::new(&root_path, err.to_string(), WarningKind::InvalidConfig);
                return root_failure(&root_path, warning, start);
            }
        };

        let (root_stat, total_bytes) = match self.inspect_root(&root_path).await {
            Ok(root_info) => root_info,
            Err(err) => {
                return root_failure(&root_path, ScanWarning::metadata_error(&root_path, &err), start);
            }
        };

        info!(
            root = %root_path.display(),
            workers = config.workers,
            parallel_depth = config.parallel_depth,
            "Starting scan"
        );

        let ctx = Arc::new(ScanContext {
            fs: Arc::clone(&self.fs),
            gate: Semaphore::new(config.workers.max(1)),
            cancel: cancel.clone(),
            tracker: InodeTracker::new(),
            classifier: VolumeClassifier::new(config.skip_network),
            ignore,
            root_device: config.one_filesystem.then_some(root_stat.device),
            next_id: AtomicU64::new(0),
            stopped_early: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
            progress: ProgressReporter::new(
                progress,
                cancel.clone(),
                config.progress_interval(),
                config.progress_every,
                total_bytes,
            ),
            config: config.clone(),
        });

        // An alias that loops back to the root is caught like any other.
        if let Some((device, inode)) = root_stat.identity() {
            ctx.tracker.mark_seen(device, inode);
        }
        let root = ctx.node_for(root_path.clone(), &root_stat);
        let root = if root_stat.is_dir() {
            scan_dir(Arc::clone(&ctx), root, 0).await
        } else {
            root
        };

        let completed = !ctx.stopped_early.load(Ordering::Acquire);
        ctx.progress.finish(completed);
        let counters = ctx.progress.snapshot();
        debug!(directories = ctx.tracker.len(), "Tracked directory identities");

        let outcome = ScanOutcome {
            stats: TreeStats::from_root(&root),
            root: Some(root),
            root_path,
            completed,
            errors: ctx.take_errors(),
            skipped: ctx.take_skipped(),
            placeholders_skipped: counters.placeholders_skipped,
            scanned_at,
            scan_duration: start.elapsed(),
        };

        info!(
            completed,
            files = outcome.stats.total_files,
            dirs = outcome.stats.total_dirs,
            bytes = outcome.total_size(),
            errors = outcome.errors.len(),
            skipped = outcome.skipped.len(),
            elapsed_ms = outcome.scan_duration.as_millis() as u64,
            "Scan finished"
        );
        outcome
    }

    /// Stat the root and ask for a usage estimate, off the async threads.
    async fn inspect_root(&self, root: &Path) -> Result<(EntryStat, Option<u64>), ScanError> {
        let fs = Arc::clone(&self.fs);
        let path = root.to_path_buf();
        let inspected = task::spawn_blocking(move || {
            let stat = fs.stat_root(&path)?;
            let total = if stat.is_dir() {
                fs.usage_estimate(&path)
            } else {
                Some(stat.size)
            };
            Ok::<_, std::io::Error>((stat, total))
        })
        .await;

        match inspected {
            Ok(Ok(root_info)) => Ok(root_info),
            Ok(Err(err)) => Err(ScanError::io(root, err)),
            Err(join_err) => Err(ScanError::Other {
                message: join_err.to_string(),
            }),
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

fn root_failure(root: &Path, warning: ScanWarning, start: Instant) -> ScanOutcome {
    warn!(root = %root.display(), error = %warning.message, "Scan root is not accessible");
    ScanOutcome::failed(root, warning, start.elapsed())
}

/// Compile name patterns into one matcher.
fn compile_ignore(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
            message: format!("bad ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidConfig {
        message: e.to_string(),
    })
}

/// State shared by every traversal task of one scan.
struct ScanContext {
    fs: Arc<dyn FileSystem>,
    gate: Semaphore,
    cancel: CancellationToken,
    tracker: InodeTracker,
    classifier: VolumeClassifier,
    ignore: GlobSet,
    root_device: Option<u64>,
    next_id: AtomicU64,
    /// Set by whichever task gave up part of the tree on cancellation.
    stopped_early: AtomicBool,
    errors: Mutex<Vec<ScanWarning>>,
    skipped: Mutex<Vec<SkipRecord>>,
    progress: ProgressReporter,
    config: ScanConfig,
}

impl ScanContext {
    fn node_for(&self, path: PathBuf, stat: &EntryStat) -> FileNode {
        let id = NodeId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        FileNode::new(id, path, stat.kind, stat.size, stat.modified)
            .with_inode(InodeInfo::new(stat.inode, stat.device))
    }

    /// Check for cancellation, noting that the tree will be partial.
    fn should_stop(&self) -> bool {
        let stop = self.cancel.is_cancelled();
        if stop {
            self.stopped_early.store(true, Ordering::Release);
        }
        stop
    }

    fn record_error(&self, warning: ScanWarning) {
        self.progress.record_error();
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    fn record_read_failure(&self, path: &Path, err: &ScanError) {
        match err {
            ScanError::Timeout { .. } => warn!(path = %path.display(), "Directory read timed out"),
            _ => debug!(path = %path.display(), error = %err, "Cannot read directory"),
        }
        self.record_error(ScanWarning::read_error(path, err));
    }

    fn skip(&self, path: PathBuf, reason: SkipReason) {
        debug!(path = %path.display(), %reason, "Skipping");
        self.skipped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SkipRecord::new(path, reason));
    }

    fn take_errors(&self) -> Vec<ScanWarning> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn take_skipped(&self) -> Vec<SkipRecord> {
        std::mem::take(&mut *self.skipped.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.config.should_skip_hidden(name) || self.ignore.is_match(name)
    }

    /// Turn one listing into child nodes, in listing order.
    ///
    /// Runs on the blocking pool: every entry is stat'ed here.
    fn visit_entries(&self, parent: &Path, names: Vec<OsString>) -> Vec<FileNode> {
        let mut children = Vec::with_capacity(names.len());

        for name in names {
            if self.should_stop() {
                break;
            }

            let path = parent.join(&name);
            let name = name.to_string_lossy();

            if is_cloud_placeholder(&name) {
                self.progress.record_placeholder();
                self.skip(path, SkipReason::CloudPlaceholder);
                continue;
            }

            if self.is_excluded(&name) {
                continue;
            }

            if self.classifier.is_enabled() {
                let fs_type = self.fs.fs_type(&path);
                if let Some(reason) = self.classifier.classify(&path, fs_type.as_deref()) {
                    self.skip(path, reason);
                    continue;
                }
            }

            let stat = match self.fs.stat(&path) {
                Ok(stat) => stat,
                Err(err) => {
                    let err = ScanError::io(&path, err);
                    self.record_error(ScanWarning::metadata_error(&path, &err));
                    continue;
                }
            };

            if stat.is_dir() {
                let first_visit = stat
                    .identity()
                    .is_none_or(|(device, inode)| self.tracker.track(device, inode));
                if !first_visit {
                    self.skip(path, SkipReason::Alias);
                    continue;
                }
                if self.root_device.is_some_and(|device| device != stat.device) {
                    self.skip(
                        path,
                        SkipReason::DifferentFilesystem {
                            device: stat.device,
                        },
                    );
                    continue;
                }
                self.progress.record(&path, Visited::Dir);
            } else {
                self.progress.record(&path, Visited::File { size: stat.size });
            }

            children.push(self.node_for(path, &stat));
        }

        children
    }
}

/// A child in listing order: either finished, or a subdirectory still being
/// walked by its own task.
enum Slot {
    Ready(FileNode),
    Pending(PathBuf, JoinHandle<FileNode>),
}

/// Walk `dir` and return it with its subtree attached.
///
/// Each call owns the node it fills in and hands it back to the caller,
/// so no lock is ever taken on a parent's child list.
fn scan_dir(ctx: Arc<ScanContext>, mut dir: FileNode, depth: u32) -> BoxFuture<'static, FileNode> {
    async move {
        if ctx.should_stop() {
            return dir;
        }

        let listing = {
            let Ok(_permit) = ctx.gate.acquire().await else {
                ctx.stopped_early.store(true, Ordering::Release);
                return dir;
            };
            read_dir_with_timeout(Arc::clone(&ctx.fs), dir.path.clone(), ctx.config.read_timeout())
                .await
            // Permit released here, before any child work starts.
        };

        let names = match listing {
            Ok(names) => names,
            Err(err) => {
                ctx.record_read_failure(&dir.path, &err);
                return dir;
            }
        };

        if ctx.should_stop() {
            return dir;
        }

        let visit_ctx = Arc::clone(&ctx);
        let parent = dir.path.clone();
        let children = match task::spawn_blocking(move || visit_ctx.visit_entries(&parent, names)).await {
            Ok(children) => children,
            Err(join_err) => {
                warn!(path = %dir.path.display(), error = %join_err, "Entry visit failed");
                ctx.record_error(ScanWarning::new(
                    &dir.path,
                    join_err.to_string(),
                    WarningKind::TaskFailed,
                ));
                return dir;
            }
        };

        if depth < ctx.config.parallel_depth {
            debug!(path = %dir.path.display(), depth, children = children.len(), "Fanning out");
            let slots: Vec<Slot> = children
                .into_iter()
                .map(|child| {
                    if child.is_dir() {
                        let path = child.path.clone();
                        let handle = tokio::spawn(scan_dir(Arc::clone(&ctx), child, depth + 1));
                        Slot::Pending(path, handle)
                    } else {
                        Slot::Ready(child)
                    }
                })
                .collect();

            for slot in slots {
                match slot {
                    Slot::Ready(child) => {
                        dir.attach(child);
                    }
                    Slot::Pending(path, handle) => match handle.await {
                        Ok(child) => {
                            dir.attach(child);
                        }
                        Err(join_err) => {
                            warn!(path = %path.display(), error = %join_err, "Directory task failed");
                            ctx.record_error(ScanWarning::new(
                                path,
                                join_err.to_string(),
                                WarningKind::TaskFailed,
                            ));
                        }
                    },
                }
            }
        } else {
            for child in children {
                let child = if child.is_dir() {
                    scan_dir(Arc::clone(&ctx), child, depth + 1).await
                } else {
                    child
                };
                dir.attach(child);
            }
        }

        dir
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::progress::progress_channel;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/nested")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world").unwrap();
        fs::write(root.join("dir1/nested/file3.txt"), "nested content here").unwrap();
        fs::write(root.join("dir2/file4.txt"), "abc").unwrap();

        temp
    }

    fn local_config(root: &Path) -> ScanConfig {
        ScanConfig::builder()
            .root(root)
            .skip_network(false)
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_local_tree() {
        let temp = create_test_tree();
        let config = local_config(temp.path());

        let outcome = Scanner::new()
            .scan(&config, CancellationToken::new(), None)
            .await;

        assert!(outcome.completed);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.total_files(), 4);
        assert_eq!(outcome.total_dirs(), 3);
        assert_eq!(outcome.total_size(), 5 + 11 + 19 + 3);

        let root = outcome.root.as_ref().unwrap();
        let nested = root
            .find(&outcome.root_path.join("dir1/nested"))
            .unwrap();
        assert_eq!(nested.total_size(), 19);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_hidden_and_ignored() {
        let temp = create_test_tree();
        fs::write(temp.path().join(".hidden"), "secret").unwrap();
        fs::write(temp.path().join("debug.log"), "log").unwrap();

        let config = ScanConfig::builder()
            .root(temp.path())
            .skip_network(false)
            .include_hidden(false)
            .ignore_patterns(vec!["*.log".to_string()])
            .build()
            .unwrap();

        let outcome = Scanner::new()
            .scan(&config, CancellationToken::new(), None)
            .await;

        let root = outcome.root.unwrap();
        assert!(root.children.iter().all(|c| c.name != ".hidden"));
        assert!(root.children.iter().all(|c| c.name != "debug.log"));
        assert_eq!(outcome.stats.total_files, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cloud_placeholders_are_counted_not_attached() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".movie.mov.icloud"), "stub").unwrap();
        fs::write(temp.path().join("real.txt"), "data").unwrap();

        let outcome = Scanner::new()
            .scan(&local_config(temp.path()), CancellationToken::new(), None)
            .await;

        assert_eq!(outcome.placeholders_skipped, 1);
        assert_eq!(outcome.total_files(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::CloudPlaceholder);
    }

    #[tokio::test]
    async fn test_missing_root_fails_without_tree() {
        let temp = TempDir::new().unwrap();
        let config = local_config(&temp.path().join("missing"));
        let (tx, mut rx) = progress_channel();

        let outcome = Scanner::new()
            .scan(&config, CancellationToken::new(), Some(tx))
            .await;

        assert!(outcome.root.is_none());
        assert!(!outcome.completed);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, WarningKind::NotFound);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_file_root_is_single_leaf() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("only.bin");
        fs::write(&file, vec![0u8; 42]).unwrap();

        let outcome = Scanner::new()
            .scan(&local_config(&file), CancellationToken::new(), None)
            .await;

        let root = outcome.root.unwrap();
        assert!(outcome.completed);
        assert!(!root.is_dir());
        assert!(root.children.is_empty());
        assert_eq!(root.total_size(), 42);
    }

    #[tokio::test]
    async fn test_bad_ignore_pattern_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["[".to_string()])
            .build()
            .unwrap();

        let outcome = Scanner::new()
            .scan(&config, CancellationToken::new(), None)
            .await;

        assert!(outcome.root.is_none());
        assert_eq!(outcome.errors[0].kind, WarningKind::InvalidConfig);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_symlinked_directory_is_not_followed() {
        let temp = create_test_tree();
        std::os::unix::fs::symlink(temp.path().join("dir1"), temp.path().join("link")).unwrap();

        let outcome = Scanner::new()
            .scan(&local_config(temp.path()), CancellationToken::new(), None)
            .await;

        let root = outcome.root.unwrap();
        let link = root.children.iter().find(|c| c.name == "link").unwrap();
        assert!(link.kind.is_symlink());
        assert!(link.children.is_empty());
        assert_eq!(outcome.stats.total_dirs, 3);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_symlinked_root_is_followed() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/a.txt"), "0123456789").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let outcome = Scanner::new()
            .scan(&local_config(&temp.path().join("link")), CancellationToken::new(), None)
            .await;

        assert!(outcome.completed);
        let root = outcome.root.as_ref().unwrap();
        assert!(root.is_dir());
        assert_eq!(root.path, temp.path().join("link"));
        assert_eq!(root.children.len(), 1);
        assert_eq!(outcome.total_files(), 1);
        assert_eq!(outcome.total_size(), 10);
    }

    #[test]
    fn test_compile_ignore() {
        let set = compile_ignore(&["*.tmp".to_string(), "node_modules".to_string()]).unwrap();
        assert!(set.is_match("a.tmp"));
        assert!(set.is_match("node_modules"));
        assert!(!set.is_match("src"));
        assert!(compile_ignore(&[]).unwrap().is_empty());
    }
}
