//! Deadline-bounded directory listing.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spaceforce_core::ScanError;
use tokio::task;

use crate::fs::FileSystem;

/// List `path` on the blocking pool, giving up after `timeout`.
///
/// On timeout the blocking thread is abandoned, not killed: it keeps
/// running until the OS call returns and its result is dropped. The closure
/// owns everything it touches, so at most one pool thread leaks per stalled
/// directory and nothing is freed underneath it.
pub async fn read_dir_with_timeout(
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    timeout: Duration,
) -> Result<Vec<OsString>, ScanError> {
    let listing_path = path.clone();
    let handle = task::spawn_blocking(move || fs.read_dir(&listing_path));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(names))) => Ok(names),
        Ok(Ok(Err(err))) => Err(ScanError::io(path, err)),
        Ok(Err(join_err)) => Err(ScanError::Other {
            message: format!("directory listing task failed for {}: {join_err}", path.display()),
        }),
        Err(_) => Err(ScanError::Timeout {
            path,
            after: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::mpsc;

    use super::*;
    use crate::fs::EntryStat;

    /// Lists a fixed set of names, or blocks until released.
    struct Stub {
        names: Vec<&'static str>,
        gate: Option<Mutex<mpsc::Receiver<()>>>,
        fail: Option<io::ErrorKind>,
    }

    impl FileSystem for Stub {
        fn stat(&self, _path: &Path) -> io::Result<EntryStat> {
            Err(io::ErrorKind::Unsupported.into())
        }

        fn read_dir(&self, _path: &Path) -> io::Result<Vec<OsString>> {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            if let Some(kind) = self.fail {
                return Err(kind.into());
            }
            Ok(self.names.iter().map(OsString::from).collect())
        }

        fn fs_type(&self, _path: &Path) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_lists_names() {
        let fs = Arc::new(Stub {
            names: vec!["a", "b"],
            gate: None,
            fail: None,
        });
        let names = read_dir_with_timeout(fs, PathBuf::from("/d"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(names, vec![OsString::from("a"), OsString::from("b")]);
    }

    #[tokio::test]
    async fn test_maps_permission_denied() {
        let fs = Arc::new(Stub {
            names: vec![],
            gate: None,
            fail: Some(io::ErrorKind::PermissionDenied),
        });
        let err = read_dir_with_timeout(fs, PathBuf::from("/locked"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::PermissionDenied { ref path } if path == Path::new("/locked")));
    }

    #[tokio::test]
    async fn test_stalled_listing_times_out() {
        let (release, gate) = mpsc::channel();
        let fs = Arc::new(Stub {
            names: vec!["late"],
            gate: Some(Mutex::new(gate)),
            fail: None,
        });

        let err = read_dir_with_timeout(fs, PathBuf::from("/stuck"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout { .. }));
        assert!(err.to_string().contains("Timeout reading directory (>50ms)"));

        // Let the abandoned thread finish so runtime shutdown is quick.
        drop(release);
    }
}
