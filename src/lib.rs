//! Core library for `fm_offload`.
//!
//! An onboard file manager that hands file and directory operations to a
//! dedicated low-priority worker so the command path never blocks on disk I/O.
//!
//! - `engine`: handshake queue, worker loop, operation handlers, events
//! - `classify`: file state classifier consumed by request validation
//! - `listing`: on-disk directory listing format
//! - `monitor`: free-space table
//! - `config`: XML configuration, default paths, validation

pub mod classify;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs_ops;
pub mod listing;
pub mod monitor;
pub mod output;
pub mod shutdown;

pub use classify::{Classifier, FileState, FsClassifier};
pub use config::{Config, LogLevel};
pub use engine::{
    EngineSettings, Event, EventId, EventSink, FileManager, FileManagerBuilder, Housekeeping,
    OperationKind, Request, Severity, Telemetry, WorkerState,
};
pub use errors::{FatalError, OpError, QueueError, SubmitError, ValidationError};
