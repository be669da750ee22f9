//! Typed error definitions for fm_offload.
//! Queue-level, producer-side, operation-local and worker-fatal failures each get
//! their own enum so callers can tell a rejected request from a failed one.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::classify::FileState;
use crate::fs_ops::helpers::describe_io_error;

/// Synchronous enqueue failures reported to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("handshake queue is full")]
    Full,

    #[error("offload worker is not running")]
    Disabled,

    #[error("handshake queue bookkeeping is inconsistent")]
    Broken,
}

impl QueueError {
    pub fn code(&self) -> u16 {
        match self {
            QueueError::Full => 101,
            QueueError::Disabled => 102,
            QueueError::Broken => 103,
        }
    }
}

/// Conditions that stop the worker for the rest of the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("wait on the handshake signal failed")]
    WaitFailed,

    #[error("woken by the handshake signal with no pending record")]
    EmptyOnSignal,

    #[error("read index {index} is outside queue depth {depth}")]
    ReadIndexCorrupt { index: usize, depth: usize },

    #[error("slot {0} was signalled but holds no record")]
    EmptySlot(usize),

    #[error("{op} handler panicked: {message}")]
    HandlerPanicked { op: String, message: String },
}

impl FatalError {
    pub fn code(&self) -> u16 {
        match self {
            FatalError::WaitFailed => 301,
            FatalError::EmptyOnSignal => 302,
            FatalError::ReadIndexCorrupt { .. } => 303,
            FatalError::EmptySlot(_) => 304,
            FatalError::HandlerPanicked { .. } => 305,
        }
    }
}

/// Operation-local failure: one filesystem primitive returned an error at execution time.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("{}", describe_io_error(.primitive, .path, .source))]
    Io {
        primitive: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write to '{}': wrote {written} of {expected} bytes", .path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    #[error("directory '{}' is not empty", .0.display())]
    NotEmpty(PathBuf),

    #[error("'{}' and '{}' are the same file", .input.display(), .output.display())]
    SameFile { input: PathBuf, output: PathBuf },

    #[error("decompress '{}' -> '{}': {cause}", .input.display(), .output.display())]
    Codec {
        input: PathBuf,
        output: PathBuf,
        cause: io::Error,
    },
}

impl OpError {
    /// Wrap an io::Error with the primitive name and the path it was applied to.
    pub fn io(primitive: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> OpError {
        let path = path.into();
        move |source| OpError::Io {
            primitive,
            path,
            source,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            OpError::Io { .. } => 401,
            OpError::ShortWrite { .. } => 402,
            OpError::NotEmpty(_) => 403,
            OpError::Codec { .. } => 404,
            OpError::SameFile { .. } => 405,
        }
    }

    /// Raw OS status carried by the failure, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            OpError::Io { source, .. } => source.raw_os_error(),
            OpError::Codec { cause, .. } => cause.raw_os_error(),
            OpError::ShortWrite { .. } | OpError::NotEmpty(_) | OpError::SameFile { .. } => None,
        }
    }
}

/// Producer-side rejections; these never reach the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid path name: '{}'", .0.display())]
    InvalidName(PathBuf),

    #[error("path '{}' is {len} bytes; the limit is {limit}", .path.display())]
    PathTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("'{}' is {state}; expected {expected}", .path.display())]
    WrongState {
        path: PathBuf,
        state: FileState,
        expected: &'static str,
    },

    #[error("'{}' and '{}' name the same file", .first.display(), .second.display())]
    SameFile { first: PathBuf, second: PathBuf },

    #[error("unknown operation code {0}")]
    UnknownOperation(u16),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ValidationError {
    pub fn code(&self) -> u16 {
        match self {
            ValidationError::InvalidName(_) => 201,
            ValidationError::PathTooLong { .. } => 202,
            ValidationError::WrongState { .. } => 203,
            ValidationError::UnknownOperation(_) => 204,
            ValidationError::InvalidArgument(_) => 205,
            ValidationError::SameFile { .. } => 206,
        }
    }
}

/// What a caller of `FileManager::submit` sees when a request is not accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("request not queued: {0}")]
    Queue(#[from] QueueError),
}

impl SubmitError {
    pub fn code(&self) -> u16 {
        match self {
            SubmitError::Rejected(v) => v.code(),
            SubmitError::Queue(q) => q.code(),
        }
    }
}
