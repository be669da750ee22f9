//! I/O error helpers.
//!
//! Enrich io::Error with the primitive that failed, the path it was applied to and
//! a short platform-aware hint. Used by `OpError`'s Display and by the anyhow paths
//! in config and logging setup.
//!
//! Usage:
//!   // in functions returning anyhow::Result<_>
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create dir", dir))?;

use anyhow::anyhow;
use std::io;
use std::path::Path;

/// Human-friendly message: primitive, path, OS error, hint and raw OS code.
pub fn describe_io_error(primitive: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", primitive, path.display(), e);

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            let hint = match code {
                libc::EACCES | libc::EPERM => Some("permission denied; check ownership and mode bits"),
                libc::EXDEV => Some("cross-filesystem; rename not possible"),
                libc::EBUSY => Some("resource busy"),
                libc::ENOENT => Some("path not found"),
                libc::EEXIST => Some("already exists"),
                libc::ENOTEMPTY => Some("directory not empty"),
                libc::ENOSPC => Some("no space left on device"),
                libc::EROFS => Some("read-only filesystem"),
                libc::ENAMETOOLONG => Some("filename or path too long"),
                libc::EMFILE | libc::ENFILE => Some("file descriptor limit reached"),
                _ => None,
            };
            if let Some(hint) = hint {
                msg.push_str("; ");
                msg.push_str(hint);
            }
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        let hint = match e.kind() {
            io::ErrorKind::PermissionDenied => Some("permission denied"),
            io::ErrorKind::NotFound => Some("path not found"),
            io::ErrorKind::AlreadyExists => Some("already exists"),
            io::ErrorKind::UnexpectedEof => Some("truncated input"),
            _ => None,
        };
        if let Some(hint) = hint {
            msg.push_str("; ");
            msg.push_str(hint);
        }
    }

    msg
}

/// Adapter for anyhow::Result code.
/// Returns a closure suitable for `.map_err(...)` that converts io::Error -> anyhow::Error.
pub fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| anyhow!(describe_io_error(op, path, &e))
}
