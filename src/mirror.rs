use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Local directory tree that mirrors the remote namespace: every object is
/// written at the same relative path under `root`.
#[derive(Debug, Clone)]
pub struct Mirror {
    root: Utf8PathBuf,
}

impl Mirror {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn local_path(&self, relative_path: &str) -> Utf8PathBuf {
        self.root.join(relative_path)
    }

    pub fn ensure_root(&self) -> Result<(), FetchError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))
    }

    pub fn exists(&self, relative_path: &str) -> bool {
        self.local_path(relative_path).as_std_path().exists()
    }

    pub fn read_to_string(&self, relative_path: &str) -> Result<String, FetchError> {
        fs::read_to_string(self.local_path(relative_path).as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FetchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.root.join("fetch_report.json")
    }

    /// Record what a run actually did next to the downloaded files.
    pub fn write_report(&self, report: &FetchReport) -> Result<(), FetchError> {
        let content = serde_json::to_vec_pretty(report)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&self.report_path(), &content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub workflow: String,
    pub variant: String,
    pub generations: u32,
    pub seed_dirs: usize,
    pub queued: usize,
    pub transferred: usize,
    pub failed: Vec<String>,
    pub fetched_at: String,
    pub tool: String,
}
