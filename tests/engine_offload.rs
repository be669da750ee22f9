use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fm_offload::engine::events::MemorySink;
use fm_offload::engine::{EngineSettings, EventId, FileManager, OperationKind, Request, Telemetry};
use fm_offload::errors::{QueueError, SubmitError, ValidationError};
use fm_offload::{Classifier, FileState, FsClassifier};
use fs2::FileExt;
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(10);

fn settings() -> EngineSettings {
    EngineSettings {
        max_path_len: 4096,
        yield_sleep: Duration::ZERO,
        ..EngineSettings::default()
    }
}

fn start() -> (FileManager, Arc<MemorySink>) {
    let sink = MemorySink::new();
    let fm = FileManager::start(settings(), sink.clone());
    (fm, sink)
}

#[test]
fn copy_end_to_end_updates_counters() {
    let td = tempdir().unwrap();
    let src = td.path().join("src.bin");
    let dst = td.path().join("dst.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&src, &data).unwrap();

    let (fm, sink) = start();
    let seq = fm
        .submit(Request::Copy {
            source: src.clone(),
            target: dst.clone(),
            overwrite: false,
        })
        .unwrap();
    assert_eq!(seq, 0);
    assert!(fm.drain(WAIT));

    assert_eq!(fs::read(&dst).unwrap(), data);
    assert!(src.exists());

    let hk = fm.housekeeping();
    assert_eq!(hk.command_count, 1);
    assert_eq!(hk.command_error_count, 0);
    assert_eq!(hk.worker.success_count, 1);
    assert_eq!(hk.worker.error_count, 0);
    assert_eq!(hk.worker.previous, Some(OperationKind::Copy));
    assert_eq!(hk.worker.current, None);

    let done = sink.events_with(EventId::Completed);
    assert_eq!(done.len(), 1);
    assert!(done[0].message.contains("10000 bytes"), "{}", done[0].message);
}

#[test]
fn records_run_in_submission_order() {
    let td = tempdir().unwrap();
    let a = td.path().join("a");
    let (fm, sink) = start();
    fm.submit(Request::CreateDirectory { path: a.clone() }).unwrap();
    assert!(fm.drain(WAIT));
    fm.submit(Request::DeleteDirectory { path: a.clone() }).unwrap();
    assert!(fm.drain(WAIT));

    let kinds: Vec<_> = sink
        .events_with(EventId::Completed)
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![Some(OperationKind::CreateDirectory), Some(OperationKind::DeleteDirectory)]
    );
    assert!(!a.exists());
}

#[test]
fn delete_all_skips_open_files_and_subdirectories() {
    let td = tempdir().unwrap();
    let dir = td.path().join("d");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("closed.txt"), b"x").unwrap();
    fs::write(dir.join("open.txt"), b"y").unwrap();
    fs::create_dir(dir.join("sub")).unwrap();

    let holder = fs::File::open(dir.join("open.txt")).unwrap();
    holder.lock_exclusive().unwrap();

    let (fm, sink) = start();
    fm.submit(Request::DeleteAll { directory: dir.clone() }).unwrap();
    assert!(fm.drain(WAIT));

    assert!(!dir.join("closed.txt").exists());
    assert!(dir.join("open.txt").exists());
    assert!(dir.join("sub").is_dir());

    let st = fm.worker_state();
    assert_eq!(st.success_count, 1);
    assert_eq!(st.warning_count, 2);
    assert_eq!(sink.events_with(EventId::DirectoriesSkipped).len(), 1);
    assert_eq!(sink.events_with(EventId::FilesNotDeleted).len(), 1);
    let done = sink.events_with(EventId::Completed);
    assert!(done[0].message.contains("deleted 1 files"), "{}", done[0].message);

    FileExt::unlock(&holder).unwrap();
}

#[test]
fn directory_packet_pages_through_entries() {
    let td = tempdir().unwrap();
    for i in 0..25 {
        fs::write(td.path().join(format!("f{i:02}")), b"").unwrap();
    }

    let (fm, sink) = start();
    for offset in [0u32, 20, 25] {
        fm.submit(Request::DirListToPacket {
            directory: td.path().to_path_buf(),
            offset,
            query_stats: false,
        })
        .unwrap();
        assert!(fm.drain(WAIT));
    }

    let pages: Vec<_> = sink
        .telemetry_records()
        .into_iter()
        .filter_map(|t| match t {
            Telemetry::DirListing(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].entries.len(), 20);
    assert_eq!(pages[1].entries.len(), 5);
    assert_eq!(pages[1].first_offset, 20);
    assert!(pages[2].entries.is_empty());
    assert!(pages.iter().all(|p| p.total_entries == 25));

    let mut names: Vec<_> = pages
        .iter()
        .flat_map(|p| p.entries.iter().map(|e| e.name.clone()))
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 25);
}

#[test]
fn get_file_info_reports_crc_for_closed_file() {
    let td = tempdir().unwrap();
    let f = td.path().join("check");
    fs::write(&f, b"123456789").unwrap();

    let (fm, sink) = start();
    fm.submit(Request::GetFileInfo { path: f.clone(), crc: 3 }).unwrap();
    assert!(fm.drain(WAIT));

    let info = sink
        .telemetry_records()
        .into_iter()
        .find_map(|t| match t {
            Telemetry::FileInfo(i) => Some(i),
            _ => None,
        })
        .unwrap();
    assert_eq!(info.state, FileState::IsClosed);
    assert_eq!(info.size, 9);
    assert!(info.crc_computed);
    assert_eq!(info.crc, 0xCBF4_3926);
    assert_eq!(fm.worker_state().warning_count, 0);
}

#[test]
fn get_file_info_warns_instead_of_crc_on_open_file() {
    let td = tempdir().unwrap();
    let f = td.path().join("busy");
    fs::write(&f, b"data").unwrap();
    let holder = fs::File::open(&f).unwrap();
    holder.lock_exclusive().unwrap();

    let (fm, sink) = start();
    fm.submit(Request::GetFileInfo { path: f.clone(), crc: 1 }).unwrap();
    assert!(fm.drain(WAIT));

    assert_eq!(sink.events_with(EventId::CrcNotClosed).len(), 1);
    let st = fm.worker_state();
    assert_eq!(st.success_count, 1);
    assert_eq!(st.warning_count, 1);
    FileExt::unlock(&holder).unwrap();
}

#[test]
fn get_file_info_unknown_selector_is_a_warning() {
    let td = tempdir().unwrap();
    let f = td.path().join("plain");
    fs::write(&f, b"data").unwrap();

    let (fm, sink) = start();
    fm.submit(Request::GetFileInfo { path: f, crc: 9 }).unwrap();
    assert!(fm.drain(WAIT));
    assert_eq!(sink.events_with(EventId::CrcUnrecognized).len(), 1);
    assert_eq!(fm.worker_state().success_count, 1);
}

#[test]
fn concat_joins_two_files() {
    let td = tempdir().unwrap();
    let a = td.path().join("a");
    let b = td.path().join("b");
    let out = td.path().join("ab");
    fs::write(&a, b"hello ").unwrap();
    fs::write(&b, b"world").unwrap();

    let (fm, _sink) = start();
    fm.submit(Request::Concatenate {
        source1: a,
        source2: b,
        target: out.clone(),
    })
    .unwrap();
    assert!(fm.drain(WAIT));
    assert_eq!(fs::read(&out).unwrap(), b"hello world");
}

#[test]
fn decompress_writes_target() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let td = tempdir().unwrap();
    let gz = td.path().join("data.gz");
    let mut enc = GzEncoder::new(fs::File::create(&gz).unwrap(), Compression::default());
    enc.write_all(b"telemetry frame").unwrap();
    enc.finish().unwrap();

    let out = td.path().join("data");
    let (fm, _sink) = start();
    fm.submit(Request::Decompress {
        source: gz,
        target: out.clone(),
    })
    .unwrap();
    assert!(fm.drain(WAIT));
    assert_eq!(fs::read(&out).unwrap(), b"telemetry frame");
    assert_eq!(fm.worker_state().success_count, 1);
}

#[test]
fn execution_failure_counts_an_error() {
    let td = tempdir().unwrap();
    let d = td.path().join("full");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("f"), b"").unwrap();

    let (fm, sink) = start();
    fm.submit(Request::DeleteDirectory { path: d.clone() }).unwrap();
    assert!(fm.drain(WAIT));

    let st = fm.worker_state();
    assert_eq!(st.error_count, 1);
    assert_eq!(st.success_count, 0);
    assert_eq!(sink.events_with(EventId::Failed).len(), 1);
    assert!(d.exists());
}

#[test]
fn rejected_request_never_reaches_worker() {
    let td = tempdir().unwrap();
    let (fm, sink) = start();
    let err = fm
        .submit(Request::Delete {
            path: td.path().join("missing"),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(ValidationError::WrongState { .. })
    ));

    let hk = fm.housekeeping();
    assert_eq!(hk.command_count, 0);
    assert_eq!(hk.command_error_count, 1);
    assert_eq!(hk.worker.processed, 0);
    assert_eq!(sink.events_with(EventId::CommandRejected).len(), 1);
}

#[test]
fn unknown_command_code_is_rejected() {
    let (fm, sink) = start();
    let err = fm.submit_raw(99, &[]).unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(ValidationError::UnknownOperation(99))
    ));
    assert_eq!(fm.housekeeping().command_error_count, 1);
    assert_eq!(sink.events_with(EventId::CommandRejected).len(), 1);
}

#[test]
fn raw_mkdir_decodes_and_runs() {
    let td = tempdir().unwrap();
    let d = td.path().join("raw");
    let (fm, _sink) = start();
    let arg = d.to_string_lossy().into_owned();
    fm.submit_raw(OperationKind::CreateDirectory.code(), &[arg.as_str()])
        .unwrap();
    assert!(fm.drain(WAIT));
    assert!(d.is_dir());
}

#[test]
fn submit_after_shutdown_is_disabled() {
    let td = tempdir().unwrap();
    let (fm, _sink) = start();
    fm.shutdown();
    assert!(!fm.is_available());
    let err = fm
        .submit(Request::CreateDirectory {
            path: td.path().join("late"),
        })
        .unwrap_err();
    assert!(matches!(err, SubmitError::Queue(QueueError::Disabled)));
}

#[test]
fn path_at_limit_is_rejected() {
    let td = tempdir().unwrap();
    let sink = MemorySink::new();
    let path = td.path().join("x");
    let fm = FileManager::start(
        EngineSettings {
            max_path_len: path.as_os_str().len(),
            ..settings()
        },
        sink,
    );
    let err = fm.submit(Request::CreateDirectory { path }).unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(ValidationError::PathTooLong { .. })
    ));
}

#[test]
fn copy_onto_itself_is_rejected() {
    let td = tempdir().unwrap();
    let f = td.path().join("keep.bin");
    fs::write(&f, b"8 bytes!").unwrap();
    let (fm, _sink) = start();

    let err = fm
        .submit(Request::Copy {
            source: f.clone(),
            target: f.clone(),
            overwrite: true,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(ValidationError::SameFile { .. })
    ));

    // Same file reached through a different spelling.
    let dotted = td.path().join(".").join("keep.bin");
    let err = fm
        .submit(Request::Move {
            source: f.clone(),
            target: dotted,
            overwrite: true,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Rejected(ValidationError::SameFile { .. })
    ));

    assert_eq!(fs::read(&f).unwrap(), b"8 bytes!");
    assert_eq!(fm.housekeeping().command_error_count, 2);
}

/// Panics when asked about any entry named `boom`.
struct TrippingClassifier;

impl Classifier for TrippingClassifier {
    fn classify(&self, path: &Path) -> FileState {
        if path.file_name().is_some_and(|n| n == "boom") {
            panic!("classifier tripped on {}", path.display());
        }
        FsClassifier.classify(path)
    }
}

#[test]
fn handler_panic_stops_worker_for_good() {
    let td = tempdir().unwrap();
    let dir = td.path().join("d");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("boom"), b"").unwrap();

    let sink = MemorySink::new();
    let fm = FileManager::builder(settings())
        .classifier(Arc::new(TrippingClassifier))
        .sink(sink.clone())
        .start();

    fm.submit(Request::DeleteAll { directory: dir.clone() })
        .unwrap();
    // Returns early on termination; the record never counts as processed.
    assert!(!fm.drain(WAIT));

    let st = fm.worker_state();
    assert!(st.terminated);
    assert_eq!(st.current, None);
    assert!(!fm.is_available());
    assert_eq!(sink.events_with(EventId::WorkerTerminated).len(), 1);

    let err = fm
        .submit(Request::CreateDirectory {
            path: td.path().join("after"),
        })
        .unwrap_err();
    assert!(matches!(err, SubmitError::Queue(QueueError::Disabled)));
}
