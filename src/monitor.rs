//! Free-space monitor table.
//!
//! A short list of volumes and directories whose space is reported on request.
//! Volume entries report available bytes from the filesystem; directory entries
//! report the total size and count of files beneath them. The table itself sits
//! behind a lock, but entries are measured after the lock is released.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Volume,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorEntry {
    pub name: PathBuf,
    pub kind: MonitorKind,
    pub enabled: bool,
}

/// Measurement for one enabled entry. `None` fields mean the query failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub name: PathBuf,
    pub kind: MonitorKind,
    pub bytes: Option<u64>,
    pub files: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("monitor table has no entry {index} (size {len})")]
    NoSuchEntry { index: usize, len: usize },
}

#[derive(Debug, Default)]
pub struct MonitorTable {
    entries: RwLock<Vec<MonitorEntry>>,
}

impl MonitorTable {
    pub fn new(entries: Vec<MonitorEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<MonitorEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new table, e.g. after the config file changed.
    pub fn replace(&self, entries: Vec<MonitorEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    pub fn set_entry_state(&self, index: usize, enabled: bool) -> Result<(), MonitorError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let len = entries.len();
        let entry = entries
            .get_mut(index)
            .ok_or(MonitorError::NoSuchEntry { index, len })?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Measure every enabled entry.
    pub fn report(&self) -> Vec<MonitorReport> {
        let enabled: Vec<MonitorEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.enabled)
            .cloned()
            .collect();
        enabled.par_iter().map(measure).collect()
    }
}

fn measure(entry: &MonitorEntry) -> MonitorReport {
    let (bytes, files) = match entry.kind {
        MonitorKind::Volume => match fs2::available_space(&entry.name) {
            Ok(b) => (Some(b), None),
            Err(e) => {
                debug!(path = %entry.name.display(), error = %e, "free space query failed");
                (None, None)
            }
        },
        MonitorKind::Directory => {
            if entry.name.is_dir() {
                let (b, f) = directory_usage(&entry.name);
                (Some(b), Some(f))
            } else {
                (None, None)
            }
        }
    };
    MonitorReport {
        name: entry.name.clone(),
        kind: entry.kind,
        bytes,
        files,
    }
}

/// Total size and number of regular files under `root`. Unreadable entries are skipped.
fn directory_usage(root: &std::path::Path) -> (u64, u64) {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .fold((0, 0), |(bytes, files), m| (bytes + m.len(), files + 1))
}
