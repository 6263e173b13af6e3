use std::sync::Mutex;

use indexmap::IndexSet;

use crate::layout;

/// Deduplicated, insertion-ordered set of relative paths pending transfer.
///
/// Built completely before any network activity so the total work is known up
/// front. The mutex makes remove-on-success safe from concurrent Phase-1
/// workers; callers drain a `snapshot()`, never the live set.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    entries: Mutex<IndexSet<String>>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `sub_dir/path` for each path. Re-inserting an already-queued
    /// path is a no-op.
    pub fn queue<I, P>(&self, sub_dir: &str, relative_paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut entries = self.entries.lock().unwrap();
        for path in relative_paths {
            entries.insert(layout::join(sub_dir, path.as_ref()));
        }
    }

    /// Insert a single path; returns false if it was already queued.
    pub fn insert(&self, path: String) -> bool {
        self.entries.lock().unwrap().insert(path)
    }

    /// Remove a path after a successful transfer; returns false if it was
    /// not present.
    pub fn remove(&self, path: &str) -> bool {
        self.entries.lock().unwrap().shift_remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Stable point-in-time copy in insertion order. The live set keeps
    /// mutating while a drain runs; iteration always happens over one of
    /// these.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }
}
