//! Directory operations: mkdir, rmdir and Delete-All.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{HandlerContext, HandlerResult};
use crate::classify::FileState;
use crate::engine::events::EventId;
use crate::errors::OpError;
use crate::fs_ops::util::joined_len;

pub(crate) fn create_directory(_ctx: &mut HandlerContext<'_>, path: &Path) -> HandlerResult {
    fs::create_dir(path).map_err(OpError::io("mkdir", path))?;
    Ok(format!("Create Directory command: dir = {}", path.display()))
}

/// Remove `path` if it has no entries.
pub(crate) fn delete_directory(_ctx: &mut HandlerContext<'_>, path: &Path) -> HandlerResult {
    let mut entries = fs::read_dir(path).map_err(OpError::io("opendir", path))?;
    // read_dir never yields `.` or `..`, so any entry at all means not empty.
    if let Some(entry) = entries.next() {
        entry.map_err(OpError::io("readdir", path))?;
        return Err(OpError::NotEmpty(path.to_path_buf()));
    }
    drop(entries);
    fs::remove_dir(path).map_err(OpError::io("rmdir", path))?;
    Ok(format!("Delete Directory command: dir = {}", path.display()))
}

/// Delete every closed regular file directly inside `directory`.
///
/// Subdirectories are skipped. Open files, names that would exceed the path
/// limit and files whose removal fails are left behind. Each of those two
/// groups produces at most one aggregate warning.
pub(crate) fn delete_all(ctx: &mut HandlerContext<'_>, directory: &Path) -> HandlerResult {
    let entries = fs::read_dir(directory).map_err(OpError::io("opendir", directory))?;

    let mut deleted = 0u32;
    let mut dirs_skipped = 0u32;
    let mut not_deleted = 0u32;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %directory.display(), error = %e, "unreadable entry");
                not_deleted += 1;
                continue;
            }
        };
        let name = entry.file_name();
        if joined_len(directory, &name) >= ctx.settings.max_path_len {
            not_deleted += 1;
            continue;
        }
        let path = entry.path();
        match ctx.classifier.classify(&path) {
            FileState::IsDirectory => dirs_skipped += 1,
            FileState::IsClosed | FileState::IsFile => match delete_internal(ctx, &path) {
                Ok(()) => deleted += 1,
                Err(_) => not_deleted += 1,
            },
            state => {
                debug!(path = %path.display(), %state, "not deleting");
                not_deleted += 1;
            }
        }
    }

    if dirs_skipped > 0 {
        ctx.warn(
            EventId::DirectoriesSkipped,
            format!(
                "Delete All command: skipped {} subdirectories: dir = {}",
                dirs_skipped,
                directory.display()
            ),
        );
    }
    if not_deleted > 0 {
        ctx.warn(
            EventId::FilesNotDeleted,
            format!(
                "Delete All command: {} files could not be deleted: dir = {}",
                not_deleted,
                directory.display()
            ),
        );
    }
    Ok(format!(
        "Delete All command: deleted {} files: dir = {}",
        deleted,
        directory.display()
    ))
}

/// Silent delete used by Delete-All. Only a failure is reported.
fn delete_internal(ctx: &HandlerContext<'_>, path: &Path) -> Result<(), OpError> {
    fs::remove_file(path).map_err(|e| {
        let err = OpError::io("remove", path)(e);
        ctx.report_error(
            EventId::InternalDeleteFailed,
            format!("Delete All command: internal delete failed: {err}"),
        );
        err
    })
}
