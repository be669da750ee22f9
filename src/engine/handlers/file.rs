//! Single-file operations: copy, move, rename, delete, decompress, concat, chmod.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{HandlerContext, HandlerResult};
use crate::errors::OpError;
use crate::fs_ops::io_copy::{append_chunked, copy_chunked};
use crate::fs_ops::util::{fsync_dir, is_cross_device, set_mode, unique_temp_path};

pub(crate) fn copy(
    ctx: &mut HandlerContext<'_>,
    source: &Path,
    target: &Path,
    overwrite: bool,
) -> HandlerResult {
    let bytes = copy_chunked(source, target, overwrite, ctx.tuning(), ctx.yielder)?;
    Ok(format!(
        "Copy command: {} bytes: src = {}, tgt = {}",
        bytes,
        source.display(),
        target.display()
    ))
}

/// Rename when possible, otherwise copy and remove the source.
pub(crate) fn move_file(
    ctx: &mut HandlerContext<'_>,
    source: &Path,
    target: &Path,
    overwrite: bool,
) -> HandlerResult {
    match fs::rename(source, target) {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => {
            debug!(src = %source.display(), dst = %target.display(), "cross-device move; copying");
            copy_chunked(source, target, overwrite, ctx.tuning(), ctx.yielder)?;
            fs::remove_file(source).map_err(OpError::io("remove", source))?;
        }
        Err(e) => return Err(OpError::io("rename", source)(e)),
    }
    Ok(format!(
        "Move command: src = {}, tgt = {}",
        source.display(),
        target.display()
    ))
}

pub(crate) fn rename(_ctx: &mut HandlerContext<'_>, source: &Path, target: &Path) -> HandlerResult {
    fs::rename(source, target).map_err(OpError::io("rename", source))?;
    Ok(format!(
        "Rename command: src = {}, tgt = {}",
        source.display(),
        target.display()
    ))
}

pub(crate) fn delete(_ctx: &mut HandlerContext<'_>, path: &Path) -> HandlerResult {
    fs::remove_file(path).map_err(OpError::io("remove", path))?;
    Ok(format!("Delete command: file = {}", path.display()))
}

/// Decode into a temporary sibling, then rename over the target name.
pub(crate) fn decompress(ctx: &mut HandlerContext<'_>, source: &Path, target: &Path) -> HandlerResult {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = unique_temp_path(dir);
    let bytes = match ctx.codec.decompress(source, &tmp) {
        Ok(n) => n,
        Err(cause) => {
            let _ = fs::remove_file(&tmp);
            return Err(OpError::Codec {
                input: source.to_path_buf(),
                output: target.to_path_buf(),
                cause,
            });
        }
    };
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(OpError::io("rename", target)(e));
    }
    if let Err(e) = fsync_dir(dir) {
        debug!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
    Ok(format!(
        "Decompress command: {} bytes: src = {}, tgt = {}",
        bytes,
        source.display(),
        target.display()
    ))
}

/// target = source1 followed by source2. A failure after the first copy leaves
/// the partial target in place.
pub(crate) fn concatenate(
    ctx: &mut HandlerContext<'_>,
    source1: &Path,
    source2: &Path,
    target: &Path,
) -> HandlerResult {
    let first = copy_chunked(source1, target, false, ctx.tuning(), ctx.yielder)?;
    let second = append_chunked(source2, target, ctx.tuning(), ctx.yielder)?;
    Ok(format!(
        "Concat command: {} bytes: src1 = {}, src2 = {}, tgt = {}",
        first + second,
        source1.display(),
        source2.display(),
        target.display()
    ))
}

pub(crate) fn set_permissions(_ctx: &mut HandlerContext<'_>, path: &Path, mode: u32) -> HandlerResult {
    set_mode(path, mode).map_err(OpError::io("chmod", path))?;
    Ok(format!("Set Permissions command: file = {}, mode = {:o}", path.display(), mode))
}
