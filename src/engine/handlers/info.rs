//! Get File Info.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{HandlerContext, HandlerResult};
use crate::classify::FileState;
use crate::engine::events::{EventId, Telemetry};
use crate::engine::record::FileSnapshot;
use crate::fs_ops::crc::{CrcAlgorithm, CrcRequest, CrcScanError, file_crc};

/// File info telemetry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfoReport {
    pub path: PathBuf,
    pub state: FileState,
    pub size: u64,
    pub mtime: u32,
    pub mode: u32,
    pub crc_algorithm: Option<CrcAlgorithm>,
    pub crc_computed: bool,
    pub crc: u32,
}

/// Report the snapshot the producer took, adding a CRC when asked for one.
///
/// A CRC is only computed for a closed file with a recognized selector. Every
/// other non-zero selector ends in exactly one warning; the operation itself
/// still succeeds and the report is still sent.
pub(crate) fn get_file_info(
    ctx: &mut HandlerContext<'_>,
    path: &Path,
    crc: CrcRequest,
    snapshot: FileSnapshot,
) -> HandlerResult {
    let attrs = snapshot.attributes.unwrap_or_default();
    let mut report = FileInfoReport {
        path: path.to_path_buf(),
        state: snapshot.state,
        size: attrs.size,
        mtime: attrs.mtime,
        mode: attrs.mode,
        crc_algorithm: None,
        crc_computed: false,
        crc: 0,
    };

    match crc {
        CrcRequest::Ignore => {}
        // Validation accepts IsFile as closed, but a CRC needs a positive answer.
        _ if snapshot.state == FileState::IsFile => ctx.warn(
            EventId::CrcNotClosed,
            format!(
                "Get File Info command: open state could not be determined, CRC not computed: file = {}",
                path.display()
            ),
        ),
        _ if snapshot.state != FileState::IsClosed => ctx.warn(
            EventId::CrcNotClosed,
            format!(
                "Get File Info command: file is {}, CRC not computed: file = {}",
                snapshot.state,
                path.display()
            ),
        ),
        CrcRequest::Unrecognized(selector) => ctx.warn(
            EventId::CrcUnrecognized,
            format!(
                "Get File Info command: unrecognized CRC type {}: file = {}",
                selector,
                path.display()
            ),
        ),
        CrcRequest::Algorithm(algorithm) => {
            report.crc_algorithm = Some(algorithm);
            match file_crc(path, algorithm, ctx.tuning(), ctx.yielder) {
                Ok(value) => {
                    report.crc = value;
                    report.crc_computed = true;
                }
                Err(e @ CrcScanError::Open { .. }) => ctx.warn(
                    EventId::CrcOpenFailed,
                    format!("Get File Info command: {e}"),
                ),
                Err(e @ CrcScanError::Read(_)) => ctx.warn(
                    EventId::CrcReadFailed,
                    format!("Get File Info command: {e}: file = {}", path.display()),
                ),
            }
        }
    }

    ctx.telemetry(Telemetry::FileInfo(report));
    Ok(format!("Get File Info command: file = {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handlers::testing::Harness;
    use crate::engine::record::OperationKind;
    use crate::fs_ops::FileAttributes;
    use std::fs;
    use tempfile::tempdir;

    fn closed(size: u64) -> FileSnapshot {
        FileSnapshot {
            state: FileState::IsClosed,
            attributes: Some(FileAttributes {
                size,
                mtime: 1,
                mode: 0o100644,
            }),
        }
    }

    fn last_report(h: &Harness) -> FileInfoReport {
        match h.sink.telemetry_records().pop() {
            Some(Telemetry::FileInfo(r)) => r,
            other => panic!("expected file info, got {other:?}"),
        }
    }

    #[test]
    fn crc32_on_closed_file() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let f = td.path().join("check");
        fs::write(&f, b"123456789").unwrap();
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, &f, CrcRequest::from_selector(3), closed(9)).unwrap();
        assert_eq!(ctx.warnings(), 0);
        let r = last_report(&h);
        assert!(r.crc_computed);
        assert_eq!(r.crc, 0xCBF4_3926);
        assert_eq!(r.size, 9);
    }

    #[test]
    fn unrecognized_selector_warns_once() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let f = td.path().join("f");
        fs::write(&f, b"x").unwrap();
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, &f, CrcRequest::from_selector(42), closed(1)).unwrap();
        assert_eq!(ctx.warnings(), 1);
        assert!(!last_report(&h).crc_computed);
    }

    #[test]
    fn open_file_warns_once_even_with_bad_selector() {
        let h = Harness::new();
        let snap = FileSnapshot {
            state: FileState::IsOpen,
            attributes: None,
        };
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, Path::new("/busy"), CrcRequest::from_selector(42), snap).unwrap();
        assert_eq!(ctx.warnings(), 1);
        assert_eq!(h.sink.events_with(EventId::CrcNotClosed).len(), 1);
    }

    #[test]
    fn unprobed_file_skips_crc_and_says_why() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let f = td.path().join("f");
        fs::write(&f, b"x").unwrap();
        let snap = FileSnapshot {
            state: FileState::IsFile,
            ..closed(1)
        };
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, &f, CrcRequest::from_selector(3), snap).unwrap();
        assert_eq!(ctx.warnings(), 1);
        let events = h.sink.events_with(EventId::CrcNotClosed);
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("open state could not be determined"));
        assert!(!last_report(&h).crc_computed);
    }

    #[test]
    fn vanished_file_is_an_open_warning() {
        let td = tempdir().unwrap();
        let h = Harness::new();
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, &td.path().join("gone"), CrcRequest::from_selector(1), closed(0))
            .unwrap();
        assert_eq!(ctx.warnings(), 1);
        assert_eq!(h.sink.events_with(EventId::CrcOpenFailed).len(), 1);
    }

    #[test]
    fn no_crc_requested_no_warning() {
        let h = Harness::new();
        let snap = FileSnapshot {
            state: FileState::IsDirectory,
            attributes: None,
        };
        let mut ctx = h.ctx(OperationKind::GetFileInfo);
        get_file_info(&mut ctx, Path::new("/ram"), CrcRequest::Ignore, snap).unwrap();
        assert_eq!(ctx.warnings(), 0);
        assert_eq!(last_report(&h).state, FileState::IsDirectory);
    }
}
