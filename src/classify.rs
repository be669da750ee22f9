//! Filesystem object classification.
//!
//! The producer validates every request against a [`FileState`] and Delete-All
//! asks the same question per directory entry. "Open" is approximated with an
//! advisory exclusive lock probe: a file someone else holds a lock on is in use.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use fs2::FileExt;
use serde::Serialize;
use tracing::debug;

use crate::fs_ops::FileAttributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Name is syntactically unusable.
    Invalid,
    /// Neither the object nor its parent directory exists.
    DoesNotExist,
    /// Something exists but it is neither a regular file nor a directory.
    Exists,
    IsDirectory,
    /// Regular file whose open state could not be determined.
    IsFile,
    IsOpen,
    IsClosed,
    /// Free name inside an existing directory.
    NotInUse,
}

impl FileState {
    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Invalid => "invalid",
            FileState::DoesNotExist => "does not exist",
            FileState::Exists => "exists",
            FileState::IsDirectory => "a directory",
            FileState::IsFile => "a file",
            FileState::IsOpen => "an open file",
            FileState::IsClosed => "a closed file",
            FileState::NotInUse => "not in use",
        }
    }

    /// A regular file that nothing is known to hold open.
    pub fn is_closed_file(self) -> bool {
        matches!(self, FileState::IsClosed | FileState::IsFile)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies paths for validation and Delete-All.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &Path) -> FileState;

    fn attributes(&self, path: &Path) -> Option<FileAttributes> {
        FileAttributes::of(path).ok()
    }
}

/// Classifier backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsClassifier;

impl Classifier for FsClassifier {
    fn classify(&self, path: &Path) -> FileState {
        if !name_is_valid(path) {
            return FileState::Invalid;
        }
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return missing_state(path),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "stat failed during classification");
                return FileState::Invalid;
            }
        };
        if meta.is_dir() {
            FileState::IsDirectory
        } else if meta.is_file() {
            probe_open(path)
        } else {
            FileState::Exists
        }
    }
}

fn name_is_valid(path: &Path) -> bool {
    let raw = path.as_os_str();
    !raw.is_empty() && !raw.as_encoded_bytes().contains(&0)
}

fn missing_state(path: &Path) -> FileState {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => FileState::NotInUse,
        _ => FileState::DoesNotExist,
    }
}

fn probe_open(path: &Path) -> FileState {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return FileState::IsFile,
    };
    match FileExt::try_lock_exclusive(&file) {
        // Lock is released when `file` drops.
        Ok(()) => FileState::IsClosed,
        Err(e) if is_contended(&e) => FileState::IsOpen,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "lock probe unsupported");
            FileState::IsFile
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
