//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the progress channel. Snapshots that do not fit are dropped.
pub const PROGRESS_CHANNEL_SIZE: usize = 100;

/// Sending half handed to [`Scanner::scan`](crate::Scanner::scan).
pub type ProgressSender = mpsc::Sender<ScanProgress>;

/// Receiving half; yields `None` once the scan has finished.
pub type ProgressReceiver = mpsc::Receiver<ScanProgress>;

/// Create a progress channel with the standard capacity.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(PROGRESS_CHANNEL_SIZE)
}

/// Progress information during a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanProgress {
    /// Path of the most recently visited entry.
    pub current_path: PathBuf,
    /// Number of non-directory entries visited so far.
    pub files_scanned: u64,
    /// Number of directories visited so far (excluding the root).
    pub dirs_scanned: u64,
    /// Total bytes of visited files.
    pub bytes_scanned: u64,
    /// Estimated bytes in use under the root, if known up front.
    pub total_bytes: Option<u64>,
    /// Number of errors recorded so far.
    pub errors_count: u64,
    /// Number of cloud placeholders passed over.
    pub placeholders_skipped: u64,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
    /// Set only on the final snapshot of a scan that ran to completion.
    pub complete: bool,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate scan rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }

    /// Fraction of the estimated total covered so far, clamped to 1.0.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some((self.bytes_scanned as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// What kind of entry was just visited.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Visited {
    File { size: u64 },
    Dir,
}

#[derive(Debug)]
struct ReporterState {
    snapshot: ScanProgress,
    visited: u64,
    last_flush: Instant,
    tx: Option<ProgressSender>,
}

/// Shared, throttled progress accumulator.
///
/// Every update and every send happens under one lock, so the counters in
/// consecutive snapshots never go backwards.
#[derive(Debug)]
pub(crate) struct ProgressReporter {
    state: Mutex<ReporterState>,
    cancel: CancellationToken,
    interval: Duration,
    every: u64,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(
        tx: Option<ProgressSender>,
        cancel: CancellationToken,
        interval: Duration,
        every: u64,
        total_bytes: Option<u64>,
    ) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(ReporterState {
                snapshot: ScanProgress {
                    total_bytes,
                    ..ScanProgress::default()
                },
                visited: 0,
                last_flush: now,
                tx,
            }),
            cancel,
            interval,
            every: every.max(1),
            started: now,
        }
    }

    /// Count a visited entry and flush if the throttle allows.
    pub fn record(&self, path: &Path, visited: Visited) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match visited {
            Visited::File { size } => {
                state.snapshot.files_scanned += 1;
                state.snapshot.bytes_scanned += size;
            }
            Visited::Dir => state.snapshot.dirs_scanned += 1,
        }
        state.snapshot.current_path = path.to_path_buf();
        state.visited += 1;

        let due = state.last_flush.elapsed() >= self.interval || state.visited % self.every == 0;
        if due {
            self.flush(&mut state);
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.snapshot.errors_count += 1;
        }
    }

    pub fn record_placeholder(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.snapshot.placeholders_skipped += 1;
        }
    }

    /// Current counters, without sending.
    pub fn snapshot(&self) -> ScanProgress {
        self.state
            .lock()
            .map(|state| {
                let mut snapshot = state.snapshot.clone();
                snapshot.elapsed = self.started.elapsed();
                snapshot
            })
            .unwrap_or_default()
    }

    /// Close the channel. A completed scan first gets one last snapshot with
    /// `complete` set; a cancelled one gets nothing more.
    pub fn finish(&self, complete: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if complete {
            state.snapshot.complete = true;
            self.flush(&mut state);
        }
        state.tx = None;
    }

    fn flush(&self, state: &mut ReporterState) {
        state.last_flush = Instant::now();
        if self.cancel.is_cancelled() {
            return;
        }
        let Some(tx) = state.tx.as_ref() else {
            return;
        };
        let mut snapshot = state.snapshot.clone();
        snapshot.elapsed = self.started.elapsed();
        // Full or closed: the consumer misses this one.
        let _ = tx.try_send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(tx: ProgressSender, interval: Duration, every: u64) -> ProgressReporter {
        ProgressReporter::new(Some(tx), CancellationToken::new(), interval, every, None)
    }

    fn drain(rx: &mut ProgressReceiver) -> Vec<ScanProgress> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    #[test]
    fn test_progress_rates() {
        let progress = ScanProgress {
            files_scanned: 100,
            bytes_scanned: 1000,
            dirs_scanned: 5,
            elapsed: Duration::from_secs(10),
            total_bytes: Some(4000),
            ..ScanProgress::default()
        };
        assert_eq!(progress.files_per_second(), 10.0);
        assert_eq!(progress.bytes_per_second(), 100.0);
        assert_eq!(progress.total_items(), 105);
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(ScanProgress::default().files_per_second(), 0.0);
        assert_eq!(ScanProgress::default().fraction(), None);
    }

    #[test]
    fn test_flushes_every_n_entries() {
        let (tx, mut rx) = progress_channel();
        let reporter = reporter(tx, Duration::from_secs(3600), 3);

        for i in 0..7 {
            reporter.record(Path::new(&format!("/r/{i}")), Visited::File { size: 1 });
        }

        let sent = drain(&mut rx);
        let counts: Vec<u64> = sent.iter().map(|p| p.files_scanned).collect();
        assert_eq!(counts, vec![3, 6]);
        assert_eq!(sent[1].current_path, PathBuf::from("/r/5"));
    }

    #[test]
    fn test_flushes_after_interval() {
        let (tx, mut rx) = progress_channel();
        let reporter = reporter(tx, Duration::ZERO, 1_000);

        reporter.record(Path::new("/r/a"), Visited::Dir);
        reporter.record(Path::new("/r/b"), Visited::File { size: 5 });

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].dirs_scanned, 1);
        assert_eq!(sent[1].bytes_scanned, 5);
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(2);
        let reporter = reporter(tx, Duration::ZERO, 1);

        for _ in 0..10 {
            reporter.record(Path::new("/r/x"), Visited::File { size: 0 });
        }

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(reporter.snapshot().files_scanned, 10);
    }

    #[test]
    fn test_finish_sends_final_and_closes() {
        let (tx, mut rx) = progress_channel();
        let reporter = reporter(tx, Duration::from_secs(3600), 1_000);
        reporter.record(Path::new("/r/a"), Visited::File { size: 10 });
        reporter.record_error();
        reporter.record_placeholder();
        reporter.finish(true);

        let last = rx.try_recv().unwrap();
        assert!(last.complete);
        assert_eq!(last.files_scanned, 1);
        assert_eq!(last.errors_count, 1);
        assert_eq!(last.placeholders_skipped, 1);
        assert_eq!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected));
    }

    #[test]
    fn test_cancelled_reporter_sends_nothing() {
        let (tx, mut rx) = progress_channel();
        let cancel = CancellationToken::new();
        let reporter = ProgressReporter::new(Some(tx), cancel.clone(), Duration::ZERO, 1, None);

        reporter.record(Path::new("/r/a"), Visited::File { size: 1 });
        cancel.cancel();
        reporter.record(Path::new("/r/b"), Visited::File { size: 1 });
        reporter.finish(false);

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected));
    }

    #[test]
    fn test_no_channel_still_counts() {
        let reporter =
            ProgressReporter::new(None, CancellationToken::new(), Duration::ZERO, 1, Some(9));
        reporter.record(Path::new("/r/a"), Visited::File { size: 4 });
        reporter.finish(true);

        let snap = reporter.snapshot();
        assert_eq!(snap.bytes_scanned, 4);
        assert_eq!(snap.total_bytes, Some(9));
        assert!(snap.complete);
    }
}
