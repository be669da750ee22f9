//! Directory listings, to a telemetry packet or to a file.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::{HandlerContext, HandlerResult};
use crate::engine::events::{EventId, Telemetry};
use crate::engine::yield_point::YieldBudget;
use crate::errors::OpError;
use crate::fs_ops::FileAttributes;
use crate::fs_ops::io_copy::write_exact;
use crate::fs_ops::util::joined_len;
use crate::listing::{HEADER_LEN, ListingEntry, ListingHeader, ListingStats};

/// Rows per telemetry packet.
pub const DIR_LIST_PKT_ENTRIES: usize = 20;
/// Rows per listing file.
pub const DIR_LIST_FILE_ENTRIES: usize = 200;

/// One page of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirListPacket {
    pub directory: PathBuf,
    /// Every entry seen during the scan.
    pub total_entries: u32,
    pub first_offset: u32,
    pub entries: Vec<ListingEntry>,
}

/// Scan counters: entries seen so far and rows produced.
#[derive(Debug, Default, Clone, Copy)]
struct DirectoryListCursor {
    seen: u32,
    written: u32,
}

impl DirectoryListCursor {
    /// Count `entry` as seen, readable or not. Returns it only if it was readable.
    fn admit<T>(&mut self, directory: &Path, entry: std::io::Result<T>) -> Option<T> {
        self.seen += 1;
        match entry {
            Ok(e) => Some(e),
            Err(e) => {
                debug!(dir = %directory.display(), error = %e, "unreadable entry");
                None
            }
        }
    }
}

fn make_entry(dir: &Path, name: &OsStr, query_stats: bool) -> ListingEntry {
    let mut entry = ListingEntry {
        name: name.to_string_lossy().into_owned(),
        ..ListingEntry::default()
    };
    if query_stats {
        let path = dir.join(name);
        match FileAttributes::of(&path) {
            Ok(a) => {
                entry.size = a.size;
                entry.mtime = a.mtime;
                entry.mode = a.mode;
            }
            Err(e) => debug!(path = %path.display(), error = %e, "stat failed; zero attributes"),
        }
    }
    entry
}

/// Page of up to [`DIR_LIST_PKT_ENTRIES`] rows starting after `offset` entries.
///
/// The whole directory is scanned so `total_entries` is exact. Only names inside
/// the window are length-checked; an overlong one is warned about and skipped
/// without taking a row.
pub(crate) fn list_to_packet(
    ctx: &mut HandlerContext<'_>,
    directory: &Path,
    offset: u32,
    query_stats: bool,
) -> HandlerResult {
    let entries = fs::read_dir(directory).map_err(OpError::io("opendir", directory))?;

    let mut cursor = DirectoryListCursor::default();
    let mut rows = Vec::new();
    let mut budget = YieldBudget::new(ctx.yielder, ctx.settings.yield_every);

    for entry in entries {
        let Some(entry) = cursor.admit(directory, entry) else {
            continue;
        };
        if cursor.seen > offset && (cursor.written as usize) < DIR_LIST_PKT_ENTRIES {
            let name = entry.file_name();
            if joined_len(directory, &name) >= ctx.settings.max_path_len {
                ctx.warn(
                    EventId::EntryTooLong,
                    format!(
                        "Directory List to Packet command: path too long: dir = {}, name = {}",
                        directory.display(),
                        name.to_string_lossy()
                    ),
                );
                continue;
            }
            rows.push(make_entry(directory, &name, query_stats));
            cursor.written += 1;
        }
        budget.tick();
    }

    ctx.telemetry(Telemetry::DirListing(DirListPacket {
        directory: directory.to_path_buf(),
        total_entries: cursor.seen,
        first_offset: offset,
        entries: rows,
    }));
    Ok(format!(
        "Directory List to Packet command: offset = {}, dir = {}",
        offset,
        directory.display()
    ))
}

/// Write header, stats and up to [`DIR_LIST_FILE_ENTRIES`] rows to `output`.
///
/// The stats record is written as a placeholder and patched in place once the
/// scan is done, so a reader always finds the final counts.
pub(crate) fn list_to_file(
    ctx: &mut HandlerContext<'_>,
    directory: &Path,
    output: &Path,
    query_stats: bool,
) -> HandlerResult {
    let width = ctx.settings.max_path_len;
    let mut file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .map_err(OpError::io("create", output))?;

    let header = ListingHeader::new(width, "Directory Listing");
    write_exact(&mut file, output, &header.encode())?;

    let mut stats = ListingStats {
        directory: directory.to_string_lossy().into_owned(),
        ..ListingStats::default()
    };
    write_exact(&mut file, output, &stats.encode(width))?;

    let entries = fs::read_dir(directory).map_err(OpError::io("opendir", directory))?;
    let mut cursor = DirectoryListCursor::default();
    let mut budget = YieldBudget::new(ctx.yielder, ctx.settings.yield_every);

    for entry in entries {
        let Some(entry) = cursor.admit(directory, entry) else {
            continue;
        };
        let name = entry.file_name();
        if joined_len(directory, &name) >= ctx.settings.max_path_len {
            ctx.warn(
                EventId::EntryTooLong,
                format!(
                    "Directory List to File command: path too long: dir = {}, name = {}",
                    directory.display(),
                    name.to_string_lossy()
                ),
            );
            continue;
        }
        if (cursor.written as usize) < DIR_LIST_FILE_ENTRIES {
            let row = make_entry(directory, &name, query_stats);
            write_exact(&mut file, output, &row.encode(width))?;
            cursor.written += 1;
        }
        budget.tick();
    }

    stats.dir_entries = cursor.seen;
    stats.file_entries = cursor.written;
    file.seek(SeekFrom::Start(HEADER_LEN as u64))
        .map_err(OpError::io("seek", output))?;
    write_exact(&mut file, output, &stats.encode(width))?;
    file.sync_all().map_err(OpError::io("fsync", output))?;

    Ok(format!(
        "Directory List to File command: {} of {} names: dir = {}, filename = {}",
        cursor.written,
        cursor.seen,
        directory.display(),
        output.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handlers::testing::Harness;
    use crate::engine::record::OperationKind;
    use crate::listing::ListingFile;
    use tempfile::tempdir;

    fn packet(h: &Harness) -> DirListPacket {
        match h.sink.telemetry_records().pop() {
            Some(Telemetry::DirListing(p)) => p,
            other => panic!("expected listing, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_entry_still_counts_as_seen() {
        let mut cursor = DirectoryListCursor::default();
        let dir = Path::new("/ram/d");
        assert_eq!(cursor.admit(dir, Ok("a")), Some("a"));
        let broken: std::io::Result<&str> = Err(std::io::Error::from_raw_os_error(libc::EIO));
        assert_eq!(cursor.admit(dir, broken), None);
        assert_eq!(cursor.admit(dir, Ok("b")), Some("b"));
        assert_eq!(cursor.seen, 3);
        assert_eq!(cursor.written, 0);
    }

    #[test]
    fn offset_past_end_sends_empty_packet() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        for i in 0..3 {
            fs::write(td.path().join(format!("f{i}")), b"").unwrap();
        }
        list_to_packet(&mut h.ctx(OperationKind::DirListToPacket), td.path(), 10, false).unwrap();
        let p = packet(&h);
        assert_eq!(p.total_entries, 3);
        assert!(p.entries.is_empty());
    }

    #[test]
    fn stats_are_filled_on_request() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        fs::write(td.path().join("f"), b"12345").unwrap();
        list_to_packet(&mut h.ctx(OperationKind::DirListToPacket), td.path(), 0, true).unwrap();
        assert_eq!(packet(&h).entries[0].size, 5);

        list_to_packet(&mut h.ctx(OperationKind::DirListToPacket), td.path(), 0, false).unwrap();
        assert_eq!(packet(&h).entries[0].size, 0);
    }

    #[test]
    fn file_listing_backpatches_stats() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let dir = td.path().join("d");
        fs::create_dir(&dir).unwrap();
        for i in 0..4 {
            fs::write(dir.join(format!("n{i}")), b"ab").unwrap();
        }
        let out = td.path().join("list.dat");
        list_to_file(&mut h.ctx(OperationKind::DirListToFile), &dir, &out, true).unwrap();
        let lf = ListingFile::read(&out).unwrap();
        assert_eq!(lf.stats.dir_entries, 4);
        assert_eq!(lf.stats.file_entries, 4);
        assert!(lf.rows.iter().all(|r| r.size == 2));
        assert_eq!(lf.header.name_width as usize, h.settings.max_path_len);
    }

    #[test]
    fn file_listing_missing_directory_fails_after_header() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let out = td.path().join("list.dat");
        let err = list_to_file(
            &mut h.ctx(OperationKind::DirListToFile),
            &td.path().join("nope"),
            &out,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, OpError::Io { primitive: "opendir", .. }));
        assert!(out.exists());
    }
}
