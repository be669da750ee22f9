//! Asynchronous offload engine.
//!
//! [`FileManager`] is the producer side: it validates requests, snapshots what
//! Get File Info needs, and places records on the [`HandshakeQueue`]. A single
//! low-priority worker thread drains the queue and runs the handlers.
//!
//! ```no_run
//! use fm_offload::engine::{EngineSettings, FileManager, Request};
//! use fm_offload::engine::events::NullSink;
//! use std::sync::Arc;
//!
//! let fm = FileManager::start(EngineSettings::default(), Arc::new(NullSink));
//! fm.submit(Request::CreateDirectory { path: "/ram/logs".into() })?;
//! # Ok::<(), fm_offload::errors::SubmitError>(())
//! ```

pub mod events;
pub mod handlers;
pub mod queue;
pub mod record;
pub mod worker;
pub mod yield_point;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classify::{Classifier, FileState, FsClassifier};
use crate::errors::{SubmitError, ValidationError};
use crate::fs_ops::{CrcRequest, Decompressor, GzipCodec, LoopTuning};

pub use events::{Event, EventId, EventSink, Severity, Telemetry};
pub use queue::HandshakeQueue;
pub use record::{FileSnapshot, Operation, OperationKind, QueueRecord, Request};
pub use worker::WorkerState;
pub use yield_point::{CooperativeYield, ThreadYield};

use events::Reporter;
use worker::{StatusBoard, Worker};

/// Engine knobs. Built from `Config::engine_settings()` in the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub queue_depth: usize,
    pub chunk_size: usize,
    pub yield_every: u32,
    pub yield_sleep: Duration,
    /// Longest accepted path in bytes, exclusive.
    pub max_path_len: usize,
    pub worker_nice: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_depth: 3,
            chunk_size: 2048,
            yield_every: 16,
            yield_sleep: Duration::from_millis(20),
            max_path_len: 256,
            worker_nice: 10,
        }
    }
}

impl EngineSettings {
    pub fn tuning(&self) -> LoopTuning {
        LoopTuning {
            chunk_size: self.chunk_size,
            yield_every: self.yield_every,
        }
    }
}

/// Housekeeping snapshot: producer counters plus the worker's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Housekeeping {
    pub command_count: u64,
    pub command_error_count: u64,
    pub worker: WorkerState,
    pub queue_pending: usize,
    pub queue_depth: usize,
    pub offload_available: bool,
}

pub struct FileManagerBuilder {
    settings: EngineSettings,
    classifier: Arc<dyn Classifier>,
    codec: Arc<dyn Decompressor>,
    yielder: Option<Arc<dyn CooperativeYield>>,
    sink: Arc<dyn EventSink>,
}

impl FileManagerBuilder {
    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Decompressor>) -> Self {
        self.codec = codec;
        self
    }

    pub fn yielder(mut self, yielder: Arc<dyn CooperativeYield>) -> Self {
        self.yielder = Some(yielder);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create the queue and spawn the worker. If the thread cannot be spawned the
    /// manager still comes up, but every submit reports `QueueError::Disabled`.
    pub fn start(self) -> FileManager {
        let queue = Arc::new(HandshakeQueue::new(self.settings.queue_depth));
        let status = Arc::new(StatusBoard::default());
        let reporter = Reporter::new(self.sink);
        let yielder = self
            .yielder
            .unwrap_or_else(|| Arc::new(ThreadYield::new(self.settings.yield_sleep)));

        let worker = Worker {
            queue: queue.clone(),
            status: status.clone(),
            settings: self.settings.clone(),
            classifier: self.classifier.clone(),
            codec: self.codec,
            yielder,
            reporter: reporter.clone(),
        };

        // Mark available before the thread runs so early submits are not refused.
        queue.set_available(true);
        let handle = match thread::Builder::new()
            .name("fm-worker".into())
            .spawn(move || worker.run())
        {
            Ok(h) => Some(h),
            Err(e) => {
                queue.set_available(false);
                error!(error = %e, "could not spawn offload worker; offload disabled");
                None
            }
        };

        FileManager {
            settings: self.settings,
            queue,
            status,
            classifier: self.classifier,
            reporter,
            next_sequence: AtomicU64::new(0),
            command_count: AtomicU64::new(0),
            command_error_count: AtomicU64::new(0),
            worker: Mutex::new(handle),
        }
    }
}

/// Producer front end and owner of the worker thread.
pub struct FileManager {
    settings: EngineSettings,
    queue: Arc<HandshakeQueue>,
    status: Arc<StatusBoard>,
    classifier: Arc<dyn Classifier>,
    reporter: Reporter,
    next_sequence: AtomicU64,
    /// Requests accepted onto the queue.
    command_count: AtomicU64,
    command_error_count: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileManager {
    pub fn builder(settings: EngineSettings) -> FileManagerBuilder {
        FileManagerBuilder {
            settings,
            classifier: Arc::new(FsClassifier),
            codec: Arc::new(GzipCodec),
            yielder: None,
            sink: Arc::new(events::NullSink),
        }
    }

    pub fn start(settings: EngineSettings, sink: Arc<dyn EventSink>) -> Self {
        Self::builder(settings).sink(sink).start()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validate `request` and queue it. Returns the record's sequence number.
    pub fn submit(&self, request: Request) -> Result<u64, SubmitError> {
        let kind = request.kind();
        let operation = match self.prepare(request) {
            Ok(op) => op,
            Err(e) => {
                self.reject(kind, EventId::CommandRejected, &e);
                return Err(e.into());
            }
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        match self.queue.enqueue(QueueRecord {
            sequence,
            operation,
        }) {
            Ok(()) => {
                self.command_count.fetch_add(1, Ordering::SeqCst);
                debug!(seq = sequence, op = %kind, "queued");
                Ok(sequence)
            }
            Err(e) => {
                self.reject(kind, EventId::QueueRejected, &e);
                Err(e.into())
            }
        }
    }

    /// Decode a raw numeric command and submit it.
    pub fn submit_raw(&self, code: u16, args: &[&str]) -> Result<u64, SubmitError> {
        match Request::decode(code, args) {
            Ok(req) => self.submit(req),
            Err(e) => {
                self.command_error_count.fetch_add(1, Ordering::SeqCst);
                warn!(code, error = %e, "raw command rejected");
                self.reporter.emit(Event::new(
                    EventId::CommandRejected,
                    Severity::Error,
                    None,
                    format!("command code {code} rejected: {e}"),
                ));
                Err(e.into())
            }
        }
    }

    fn reject(&self, kind: OperationKind, id: EventId, err: &dyn std::fmt::Display) {
        self.command_error_count.fetch_add(1, Ordering::SeqCst);
        self.reporter.emit(Event::new(
            id,
            Severity::Error,
            Some(kind),
            format!("{kind} command rejected: {err}"),
        ));
    }

    fn check_len(&self, path: &Path) -> Result<(), ValidationError> {
        let len = path.as_os_str().len();
        if len == 0 {
            return Err(ValidationError::InvalidName(path.to_path_buf()));
        }
        if len >= self.settings.max_path_len {
            return Err(ValidationError::PathTooLong {
                path: path.to_path_buf(),
                len,
                limit: self.settings.max_path_len,
            });
        }
        Ok(())
    }

    fn require_state(
        &self,
        path: &Path,
        allowed: &[FileState],
        expected: &'static str,
    ) -> Result<FileState, ValidationError> {
        self.check_len(path)?;
        let state = self.classifier.classify(path);
        if state == FileState::Invalid {
            return Err(ValidationError::InvalidName(path.to_path_buf()));
        }
        if !allowed.contains(&state) {
            return Err(ValidationError::WrongState {
                path: path.to_path_buf(),
                state,
                expected,
            });
        }
        Ok(state)
    }

    fn closed_file(&self, path: &Path) -> Result<FileState, ValidationError> {
        self.require_state(path, &[FileState::IsClosed, FileState::IsFile], "a closed file")
    }

    fn free_name(&self, path: &Path) -> Result<FileState, ValidationError> {
        self.require_state(path, &[FileState::NotInUse], "an unused name")
    }

    fn directory(&self, path: &Path) -> Result<FileState, ValidationError> {
        self.require_state(path, &[FileState::IsDirectory], "a directory")
    }

    fn writable_target(&self, path: &Path, overwrite: bool) -> Result<FileState, ValidationError> {
        if overwrite {
            self.require_state(
                path,
                &[FileState::NotInUse, FileState::IsClosed, FileState::IsFile],
                "an unused name or a closed file",
            )
        } else {
            self.free_name(path)
        }
    }

    /// Refuse a target that resolves to the source itself.
    fn distinct(&self, source: &Path, target: &Path) -> Result<(), ValidationError> {
        if let (Ok(a), Ok(b)) = (dunce::canonicalize(source), dunce::canonicalize(target)) {
            if a == b {
                return Err(ValidationError::SameFile {
                    first: source.to_path_buf(),
                    second: target.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn prepare(&self, request: Request) -> Result<Operation, ValidationError> {
        let op = match request {
            Request::Copy {
                source,
                target,
                overwrite,
            } => {
                self.closed_file(&source)?;
                self.writable_target(&target, overwrite)?;
                self.distinct(&source, &target)?;
                Operation::Copy {
                    source,
                    target,
                    overwrite,
                }
            }
            Request::Move {
                source,
                target,
                overwrite,
            } => {
                self.closed_file(&source)?;
                self.writable_target(&target, overwrite)?;
                self.distinct(&source, &target)?;
                Operation::Move {
                    source,
                    target,
                    overwrite,
                }
            }
            Request::Rename { source, target } => {
                self.closed_file(&source)?;
                self.free_name(&target)?;
                Operation::Rename { source, target }
            }
            Request::Delete { path } => {
                self.closed_file(&path)?;
                Operation::Delete { path }
            }
            Request::DeleteAll { directory } => {
                self.directory(&directory)?;
                Operation::DeleteAll { directory }
            }
            Request::Decompress { source, target } => {
                self.closed_file(&source)?;
                self.free_name(&target)?;
                Operation::Decompress { source, target }
            }
            Request::Concatenate {
                source1,
                source2,
                target,
            } => {
                self.closed_file(&source1)?;
                self.closed_file(&source2)?;
                self.free_name(&target)?;
                Operation::Concatenate {
                    source1,
                    source2,
                    target,
                }
            }
            Request::CreateDirectory { path } => {
                self.free_name(&path)?;
                Operation::CreateDirectory { path }
            }
            Request::DeleteDirectory { path } => {
                self.directory(&path)?;
                Operation::DeleteDirectory { path }
            }
            Request::SetPermissions { path, mode } => {
                self.require_state(
                    &path,
                    &[FileState::IsClosed, FileState::IsFile, FileState::IsDirectory],
                    "a closed file or a directory",
                )?;
                Operation::SetPermissions { path, mode }
            }
            Request::GetFileInfo { path, crc } => {
                self.check_len(&path)?;
                let state = self.classifier.classify(&path);
                if state == FileState::Invalid {
                    return Err(ValidationError::InvalidName(path));
                }
                let attributes = match state {
                    FileState::IsClosed
                    | FileState::IsFile
                    | FileState::IsOpen
                    | FileState::IsDirectory
                    | FileState::Exists => self.classifier.attributes(&path),
                    _ => None,
                };
                Operation::GetFileInfo {
                    path,
                    crc: CrcRequest::from_selector(crc),
                    snapshot: FileSnapshot { state, attributes },
                }
            }
            Request::DirListToPacket {
                directory,
                offset,
                query_stats,
            } => {
                self.directory(&directory)?;
                Operation::DirListToPacket {
                    directory,
                    offset,
                    query_stats,
                }
            }
            Request::DirListToFile {
                directory,
                output,
                query_stats,
            } => {
                self.directory(&directory)?;
                self.writable_target(&output, true)?;
                Operation::DirListToFile {
                    directory,
                    output,
                    query_stats,
                }
            }
        };
        Ok(op)
    }

    pub fn worker_state(&self) -> WorkerState {
        self.status.snapshot()
    }

    pub fn is_available(&self) -> bool {
        self.queue.is_available()
    }

    pub fn housekeeping(&self) -> Housekeeping {
        Housekeeping {
            command_count: self.command_count.load(Ordering::SeqCst),
            command_error_count: self.command_error_count.load(Ordering::SeqCst),
            worker: self.status.snapshot(),
            queue_pending: self.queue.pending(),
            queue_depth: self.queue.depth(),
            offload_available: self.queue.is_available(),
        }
    }

    /// Wait until every accepted record has been processed, or the worker has
    /// stopped. Returns false on timeout or if the worker stopped with work left.
    pub fn drain(&self, timeout: Duration) -> bool {
        let target = self.command_count.load(Ordering::SeqCst);
        self.status
            .wait_until(timeout, |s| s.processed >= target || s.terminated);
        self.status.snapshot().processed >= target
    }

    /// Close the queue and join the worker. Records already queued are still run.
    pub fn shutdown(&self) {
        self.queue.close();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle {
            if h.join().is_err() {
                error!("offload worker panicked");
            }
        }
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
