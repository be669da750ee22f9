//! Events and telemetry leaving the engine.
//!
//! Every event is written to the tracing log at the matching level and handed to
//! the configured [`EventSink`], which stands in for the host's messaging bus.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::handlers::info::FileInfoReport;
use crate::engine::handlers::listing::DirListPacket;
use crate::engine::record::OperationKind;
use crate::monitor::MonitorReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventId {
    Completed,
    Failed,
    CommandRejected,
    QueueRejected,
    EntryTooLong,
    DirectoriesSkipped,
    FilesNotDeleted,
    InternalDeleteFailed,
    CrcNotClosed,
    CrcUnrecognized,
    CrcOpenFailed,
    CrcReadFailed,
    MonitorEntryUpdated,
    WorkerTerminated,
}

impl EventId {
    pub fn code(self) -> u16 {
        match self {
            EventId::Completed => 1,
            EventId::Failed => 2,
            EventId::CommandRejected => 3,
            EventId::QueueRejected => 4,
            EventId::EntryTooLong => 10,
            EventId::DirectoriesSkipped => 11,
            EventId::FilesNotDeleted => 12,
            EventId::InternalDeleteFailed => 13,
            EventId::CrcNotClosed => 20,
            EventId::CrcUnrecognized => 21,
            EventId::CrcOpenFailed => 22,
            EventId::CrcReadFailed => 23,
            EventId::MonitorEntryUpdated => 30,
            EventId::WorkerTerminated => 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub severity: Severity,
    pub kind: Option<OperationKind>,
    pub message: String,
}

impl Event {
    pub fn new(
        id: EventId,
        severity: Severity,
        kind: Option<OperationKind>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            severity,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id.code(), self.message)
    }
}

/// Data products: directory packets, file info and free-space reports.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    DirListing(DirListPacket),
    FileInfo(FileInfoReport),
    FreeSpace { entries: Vec<MonitorReport> },
}

/// Destination for events and telemetry.
pub trait EventSink: Send + Sync {
    fn event(&self, event: &Event);

    fn telemetry(&self, _record: &Telemetry) {}
}

/// Drops everything; the tracing log still gets each event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn event(&self, _event: &Event) {}
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
    telemetry: Mutex<Vec<Telemetry>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn telemetry_records(&self) -> Vec<Telemetry> {
        self.telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_with(&self, id: EventId) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.id == id).collect()
    }
}

impl EventSink for MemorySink {
    fn event(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn telemetry(&self, record: &Telemetry) {
        self.telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

#[derive(Debug, Clone)]
pub enum Notice {
    Event(Event),
    Telemetry(Telemetry),
}

/// Forwards everything over an unbounded crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notice>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Notice>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn event(&self, event: &Event) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(Notice::Event(event.clone()));
    }

    fn telemetry(&self, record: &Telemetry) {
        let _ = self.tx.send(Notice::Telemetry(record.clone()));
    }
}

/// Logs and forwards events. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Reporter {
    sink: Arc<dyn EventSink>,
}

impl Reporter {
    pub(crate) fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: Event) {
        let code = event.id.code();
        let op = event.kind.map(|k| k.name()).unwrap_or("-");
        match event.severity {
            Severity::Info => info!(event = code, op, "{}", event.message),
            Severity::Warning => warn!(event = code, op, "{}", event.message),
            Severity::Error | Severity::Critical => error!(event = code, op, "{}", event.message),
        }
        self.sink.event(&event);
    }

    pub(crate) fn telemetry(&self, record: Telemetry) {
        debug!(record = ?record, "telemetry");
        self.sink.telemetry(&record);
    }
}
