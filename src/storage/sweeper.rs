use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;

/// Counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,
    /// Files older than the TTL that were deleted
    pub deleted: usize,
    /// Files still within the TTL
    pub kept: usize,
    /// Files that disappeared between listing and deletion
    pub vanished: usize,
    /// Entries that could not be inspected or deleted
    pub failed: usize,
}

/// Deletes regular files directly under `root` whose age exceeds `ttl`.
///
/// See [`sweep_at`].
pub fn sweep(root: &Path, ttl: Duration) -> SweepReport {
    sweep_at(root, ttl, SystemTime::now())
}

/// Deletes regular files directly under `root` whose age at `now` exceeds `ttl`.
///
/// Age is `now - mtime`; a file is deleted only when its age is strictly
/// greater than `ttl`. Directories, symlinks and other non-regular entries are
/// skipped. A missing root is an empty pass.
///
/// Per-entry failures are logged and counted, never propagated: one bad file
/// does not stop the rest of the pass. A file removed by someone else
/// mid-scan counts as `vanished`.
pub fn sweep_at(root: &Path, ttl: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(root = %root.display(), "Storage root does not exist, nothing to sweep");
            return report;
        }
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "Failed to list storage root");
            report.failed += 1;
            return report;
        }
    };

    for entry in entries {
        match entry {
            Ok(entry) => sweep_entry(&entry.path(), ttl, now, &mut report),
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Failed to read directory entry");
                report.failed += 1;
            }
        }
    }

    report
}

/// Applies the TTL to one listed path. The entry may already be gone by the
/// time it is inspected or deleted; that counts as `vanished`.
pub(crate) fn sweep_entry(path: &Path, ttl: Duration, now: SystemTime, report: &mut SweepReport) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "File vanished before it could be inspected");
            report.vanished += 1;
            return;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "TTL cleanup failed to stat file");
            report.failed += 1;
            return;
        }
    };

    if !metadata.is_file() {
        return;
    }
    report.scanned += 1;

    let modified = match metadata.modified() {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "TTL cleanup could not read mtime");
            report.failed += 1;
            return;
        }
    };

    // mtime in the future (clock skew) counts as age zero
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if age <= ttl {
        report.kept += 1;
        return;
    }

    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), age_secs = age.as_secs(), "Deleted expired staged file");
            report.deleted += 1;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Expired file already gone");
            report.vanished += 1;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "TTL cleanup failed to delete file");
            report.failed += 1;
        }
    }
}

/// Shortest accepted delay between sweeps; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic retention cleanup of the storage root.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    root: PathBuf,
    ttl: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration, interval: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.file_ttl(),
            config.sweep_interval(),
        )
    }

    /// Runs a single pass on the blocking pool.
    pub async fn run_once(&self) -> SweepReport {
        let root = self.root.clone();
        let ttl = self.ttl;
        match tokio::task::spawn_blocking(move || sweep(&root, ttl)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Sweep task panicked or was cancelled");
                SweepReport::default()
            }
        }
    }

    /// Starts the sweeper as a background task.
    ///
    /// The first pass runs immediately, then once per interval. The task stops
    /// when [`SweeperHandle::shutdown`] is called or the handle is dropped.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                root = %self.root.display(),
                ttl_secs = self.ttl.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        if report.deleted > 0 || report.failed > 0 {
                            tracing::info!(
                                deleted = report.deleted,
                                kept = report.kept,
                                failed = report.failed,
                                "Retention sweep finished"
                            );
                        }
                    }
                }
            }

            tracing::info!("Retention sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running [`RetentionSweeper`] task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the task to stop and waits for it. A pass already in progress
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Retention sweeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_empty_pass() {
        let dir = TempDir::new().unwrap();
        let report = sweep(&dir.path().join("absent"), Duration::from_secs(1));
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_directories_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let far_future = SystemTime::now() + Duration::from_secs(365 * 24 * 3600);
        let report = sweep_at(dir.path(), Duration::from_secs(1), far_future);

        assert_eq!(report.scanned, 0);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_future_mtime_is_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp3"), b"x").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        let report = sweep_at(dir.path(), Duration::ZERO, past);

        assert_eq!(report.kept, 1);
        assert_eq!(report.deleted, 0);
    }

    #[test]
    fn test_entry_removed_after_listing_counts_as_vanished() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raced.mp3");
        fs::write(&path, b"x").unwrap();
        fs::remove_file(&path).unwrap();

        let mut report = SweepReport::default();
        sweep_entry(&path, Duration::ZERO, SystemTime::now(), &mut report);

        assert_eq!(report.vanished, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.scanned, 0);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let sweeper = RetentionSweeper::new("uploads", Duration::from_secs(1800), Duration::ZERO);
        assert_eq!(sweeper.interval, MIN_SWEEP_INTERVAL);
    }

    #[tokio::test]
    async fn test_zero_interval_spawn_runs_and_stops() {
        let dir = TempDir::new().unwrap();
        let handle = RetentionSweeper::new(dir.path(), Duration::from_secs(1800), Duration::ZERO).spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_once_uses_blocking_pool() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fresh.mp3"), b"x").unwrap();

        let sweeper = RetentionSweeper::new(
            dir.path(),
            Duration::from_secs(1800),
            Duration::from_secs(300),
        );
        let report = sweeper.run_once().await;

        assert_eq!(report.scanned, 1);
        assert_eq!(report.kept, 1);
    }
}
