//! Two-phase queue drain: a bounded parallel pass, then one serial retry
//! pass over whatever the parallel pass left behind.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::mirror::Mirror;
use crate::queue::DownloadQueue;
use crate::storage::ObjectStore;

/// Outcome of one drain, constructed fresh per invocation. `failed` holds
/// the paths that failed in both phases; a non-empty list is a
/// partial-failure run.
#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub transferred: usize,
    pub failed: Vec<String>,
}

enum TaskOutcome {
    Fetched,
    Failed,
}

pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Fetch every queued entry. Phase 1 drains a snapshot with `parallelism`
/// worker threads; each success removes its path from the live queue, each
/// failure is logged and left in place. Phase 2 walks the remaining entries
/// one at a time, giving each exactly one more attempt. Paths still present
/// afterwards are permanent failures for this run.
pub fn drain_queue<S: ObjectStore + ?Sized>(
    store: &S,
    queue: &DownloadQueue,
    mirror: &Mirror,
    parallelism: usize,
) -> FetchSummary {
    let snapshot = queue.snapshot();
    let outcomes = Mutex::new(Vec::with_capacity(snapshot.len()));
    let next = AtomicUsize::new(0);
    let workers = parallelism.clamp(1, snapshot.len().max(1));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = snapshot.get(index) else {
                        break;
                    };
                    let outcome = match fetch_one(store, mirror, path) {
                        Ok(()) => {
                            queue.remove(path);
                            TaskOutcome::Fetched
                        }
                        Err(error) => {
                            warn!("transfer failed, will retry: {error}");
                            TaskOutcome::Failed
                        }
                    };
                    outcomes.lock().unwrap().push(outcome);
                }
            });
        }
    });

    let mut transferred = outcomes
        .into_inner()
        .unwrap()
        .iter()
        .filter(|outcome| matches!(outcome, TaskOutcome::Fetched))
        .count();

    // Serial retry keeps worst-case retry concurrency at one, so a burst of
    // rate-limit failures does not compound.
    for path in queue.snapshot() {
        match fetch_one(store, mirror, &path) {
            Ok(()) => {
                queue.remove(&path);
                transferred += 1;
            }
            Err(error) => warn!("transfer failed permanently: {error}"),
        }
    }

    FetchSummary {
        transferred,
        failed: queue.snapshot(),
    }
}

fn fetch_one<S: ObjectStore + ?Sized>(
    store: &S,
    mirror: &Mirror,
    path: &str,
) -> Result<(), FetchError> {
    info!("downloading {path}");
    store.transfer(path, mirror.local_path(path).as_std_path())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use camino::Utf8PathBuf;

    use crate::storage::RemoteObject;

    use super::*;

    /// Writes a one-byte file per transfer; fails the first `failures`
    /// attempts for paths listed in `fail`, counting every attempt.
    struct FlakyStore {
        root: String,
        fail: Mutex<HashMap<String, usize>>,
        attempts: Mutex<HashMap<String, usize>>,
    }

    impl FlakyStore {
        fn new(fail: &[(&str, usize)]) -> Self {
            Self {
                root: "WCM/run/".to_string(),
                fail: Mutex::new(
                    fail.iter()
                        .map(|(path, failures)| (path.to_string(), *failures))
                        .collect(),
                ),
                attempts: Mutex::new(HashMap::new()),
            }
        }

        fn attempts_for(&self, path: &str) -> usize {
            self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
        }
    }

    impl ObjectStore for FlakyStore {
        fn root_prefix(&self) -> &str {
            &self.root
        }

        fn list_by_prefix(&self, _prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
            Ok(Vec::new())
        }

        fn list_children(&self, _prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
            Ok(Vec::new())
        }

        fn transfer(&self, relative_path: &str, local_path: &Path) -> Result<(), FetchError> {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(relative_path.to_string())
                .or_insert(0) += 1;
            let mut fail = self.fail.lock().unwrap();
            if let Some(remaining) = fail.get_mut(relative_path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Transfer {
                        path: relative_path.to_string(),
                        message: "injected failure".to_string(),
                    });
                }
            }
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| FetchError::Filesystem(err.to_string()))?;
            }
            fs::write(local_path, b"x").map_err(|err| FetchError::Filesystem(err.to_string()))
        }
    }

    fn temp_mirror() -> (tempfile::TempDir, Mirror) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("mirror")).unwrap();
        (temp, Mirror::new(root))
    }

    fn fill_queue(paths: &[&str]) -> DownloadQueue {
        let queue = DownloadQueue::new();
        queue.queue("", paths.iter().copied());
        queue
    }

    #[test]
    fn drains_everything_on_success() {
        let (_temp, mirror) = temp_mirror();
        let store = FlakyStore::new(&[]);
        let queue = fill_queue(&["a/one", "a/two", "b/three"]);

        let summary = drain_queue(&store, &queue, &mirror, 4);

        assert_eq!(summary.transferred, 3);
        assert!(summary.failed.is_empty());
        assert!(queue.is_empty());
        assert!(mirror.exists("a/one"));
        assert!(mirror.exists("b/three"));
    }

    #[test]
    fn retry_pass_recovers_transient_failures() {
        let (_temp, mirror) = temp_mirror();
        let store = FlakyStore::new(&[("a/two", 1)]);
        let queue = fill_queue(&["a/one", "a/two", "b/three"]);

        let summary = drain_queue(&store, &queue, &mirror, 2);

        // Counted exactly once, attempted exactly twice.
        assert_eq!(summary.transferred, 3);
        assert!(summary.failed.is_empty());
        assert!(queue.is_empty());
        assert_eq!(store.attempts_for("a/two"), 2);
        assert_eq!(store.attempts_for("a/one"), 1);
    }

    #[test]
    fn permanent_failures_stay_in_the_queue() {
        let (_temp, mirror) = temp_mirror();
        let store = FlakyStore::new(&[("a/two", 2)]);
        let queue = fill_queue(&["a/one", "a/two", "b/three"]);

        let summary = drain_queue(&store, &queue, &mirror, 2);

        assert_eq!(summary.transferred, 2);
        assert_eq!(summary.failed, vec!["a/two".to_string()]);
        assert!(queue.contains("a/two"));
        assert_eq!(queue.len(), 1);
        // One attempt per phase, never more.
        assert_eq!(store.attempts_for("a/two"), 2);
    }

    #[test]
    fn every_path_ends_removed_or_failed() {
        let (_temp, mirror) = temp_mirror();
        let store = FlakyStore::new(&[("p2", 2), ("p4", 1)]);
        let paths = ["p0", "p1", "p2", "p3", "p4", "p5"];
        let queue = fill_queue(&paths);

        let summary = drain_queue(&store, &queue, &mirror, 3);

        assert_eq!(summary.transferred + summary.failed.len(), paths.len());
        for path in paths {
            let removed = !queue.contains(path);
            let failed = summary.failed.iter().any(|entry| entry == path);
            assert!(removed ^ failed);
        }
        assert_eq!(summary.failed, vec!["p2".to_string()]);
    }

    #[test]
    fn single_worker_drain_is_equivalent() {
        let (_temp, mirror) = temp_mirror();
        let store = FlakyStore::new(&[]);
        let queue = fill_queue(&["a", "b", "c", "d"]);

        let summary = drain_queue(&store, &queue, &mirror, 1);

        assert_eq!(summary.transferred, 4);
        assert!(queue.is_empty());
    }
}
