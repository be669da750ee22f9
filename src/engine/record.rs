//! Request and queue-record types.
//!
//! A [`Request`] is what a producer asks for. Once validated it becomes an
//! [`Operation`] inside a [`QueueRecord`]; the worker dispatches on the operation
//! variant, so every kind has exactly one handler.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::classify::FileState;
use crate::errors::ValidationError;
use crate::fs_ops::{CrcRequest, FileAttributes};

/// Fieldless mirror of the operation variants, used for status and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Rename,
    Delete,
    DeleteAll,
    Decompress,
    Concatenate,
    CreateDirectory,
    DeleteDirectory,
    SetPermissions,
    GetFileInfo,
    DirListToPacket,
    DirListToFile,
}

impl OperationKind {
    pub const ALL: [OperationKind; 13] = [
        OperationKind::Copy,
        OperationKind::Move,
        OperationKind::Rename,
        OperationKind::Delete,
        OperationKind::DeleteAll,
        OperationKind::Decompress,
        OperationKind::Concatenate,
        OperationKind::CreateDirectory,
        OperationKind::DeleteDirectory,
        OperationKind::SetPermissions,
        OperationKind::GetFileInfo,
        OperationKind::DirListToPacket,
        OperationKind::DirListToFile,
    ];

    /// Numeric command code on the external boundary.
    pub fn code(self) -> u16 {
        match self {
            OperationKind::Copy => 2,
            OperationKind::Move => 3,
            OperationKind::Rename => 4,
            OperationKind::Delete => 5,
            OperationKind::DeleteAll => 7,
            OperationKind::Decompress => 8,
            OperationKind::Concatenate => 9,
            OperationKind::GetFileInfo => 10,
            OperationKind::CreateDirectory => 12,
            OperationKind::DeleteDirectory => 13,
            OperationKind::DirListToFile => 14,
            OperationKind::DirListToPacket => 15,
            OperationKind::SetPermissions => 19,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Copy => "Copy",
            OperationKind::Move => "Move",
            OperationKind::Rename => "Rename",
            OperationKind::Delete => "Delete",
            OperationKind::DeleteAll => "Delete All",
            OperationKind::Decompress => "Decompress",
            OperationKind::Concatenate => "Concat",
            OperationKind::CreateDirectory => "Create Directory",
            OperationKind::DeleteDirectory => "Delete Directory",
            OperationKind::SetPermissions => "Set Permissions",
            OperationKind::GetFileInfo => "Get File Info",
            OperationKind::DirListToPacket => "Directory List to Packet",
            OperationKind::DirListToFile => "Directory List to File",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A producer's request, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Copy { source: PathBuf, target: PathBuf, overwrite: bool },
    Move { source: PathBuf, target: PathBuf, overwrite: bool },
    Rename { source: PathBuf, target: PathBuf },
    Delete { path: PathBuf },
    DeleteAll { directory: PathBuf },
    Decompress { source: PathBuf, target: PathBuf },
    Concatenate { source1: PathBuf, source2: PathBuf, target: PathBuf },
    CreateDirectory { path: PathBuf },
    DeleteDirectory { path: PathBuf },
    SetPermissions { path: PathBuf, mode: u32 },
    GetFileInfo { path: PathBuf, crc: u8 },
    DirListToPacket { directory: PathBuf, offset: u32, query_stats: bool },
    DirListToFile { directory: PathBuf, output: PathBuf, query_stats: bool },
}

impl Request {
    pub fn kind(&self) -> OperationKind {
        match self {
            Request::Copy { .. } => OperationKind::Copy,
            Request::Move { .. } => OperationKind::Move,
            Request::Rename { .. } => OperationKind::Rename,
            Request::Delete { .. } => OperationKind::Delete,
            Request::DeleteAll { .. } => OperationKind::DeleteAll,
            Request::Decompress { .. } => OperationKind::Decompress,
            Request::Concatenate { .. } => OperationKind::Concatenate,
            Request::CreateDirectory { .. } => OperationKind::CreateDirectory,
            Request::DeleteDirectory { .. } => OperationKind::DeleteDirectory,
            Request::SetPermissions { .. } => OperationKind::SetPermissions,
            Request::GetFileInfo { .. } => OperationKind::GetFileInfo,
            Request::DirListToPacket { .. } => OperationKind::DirListToPacket,
            Request::DirListToFile { .. } => OperationKind::DirListToFile,
        }
    }

    /// Decode a raw command: numeric code plus positional text arguments.
    ///
    /// Flags are written `0`/`1`, modes in octal, CRC selectors and offsets in decimal.
    pub fn decode(code: u16, args: &[&str]) -> Result<Request, ValidationError> {
        let kind = OperationKind::from_code(code).ok_or(ValidationError::UnknownOperation(code))?;
        let want = match kind {
            OperationKind::Delete
            | OperationKind::DeleteAll
            | OperationKind::CreateDirectory
            | OperationKind::DeleteDirectory => 1,
            OperationKind::Rename
            | OperationKind::Decompress
            | OperationKind::SetPermissions
            | OperationKind::GetFileInfo => 2,
            OperationKind::Copy
            | OperationKind::Move
            | OperationKind::Concatenate
            | OperationKind::DirListToPacket
            | OperationKind::DirListToFile => 3,
        };
        if args.len() != want {
            return Err(ValidationError::InvalidArgument(format!(
                "{kind} takes {want} arguments, got {}",
                args.len()
            )));
        }
        let p = |i: usize| PathBuf::from(args[i]);
        let req = match kind {
            OperationKind::Copy => Request::Copy { source: p(0), target: p(1), overwrite: flag(args[2])? },
            OperationKind::Move => Request::Move { source: p(0), target: p(1), overwrite: flag(args[2])? },
            OperationKind::Rename => Request::Rename { source: p(0), target: p(1) },
            OperationKind::Delete => Request::Delete { path: p(0) },
            OperationKind::DeleteAll => Request::DeleteAll { directory: p(0) },
            OperationKind::Decompress => Request::Decompress { source: p(0), target: p(1) },
            OperationKind::Concatenate => Request::Concatenate { source1: p(0), source2: p(1), target: p(2) },
            OperationKind::CreateDirectory => Request::CreateDirectory { path: p(0) },
            OperationKind::DeleteDirectory => Request::DeleteDirectory { path: p(0) },
            OperationKind::SetPermissions => Request::SetPermissions {
                path: p(0),
                mode: u32::from_str_radix(args[1], 8)
                    .map_err(|_| ValidationError::InvalidArgument(format!("bad octal mode '{}'", args[1])))?,
            },
            OperationKind::GetFileInfo => Request::GetFileInfo { path: p(0), crc: number(args[1])? },
            OperationKind::DirListToPacket => Request::DirListToPacket {
                directory: p(0),
                offset: number(args[1])?,
                query_stats: flag(args[2])?,
            },
            OperationKind::DirListToFile => Request::DirListToFile {
                directory: p(0),
                output: p(1),
                query_stats: flag(args[2])?,
            },
        };
        Ok(req)
    }
}

fn flag(s: &str) -> Result<bool, ValidationError> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ValidationError::InvalidArgument(format!("flag must be 0 or 1, got '{other}'"))),
    }
}

fn number<T: std::str::FromStr>(s: &str) -> Result<T, ValidationError> {
    s.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidArgument(format!("bad number '{s}'")))
}

/// State and attributes the producer captured for Get File Info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub state: FileState,
    pub attributes: Option<FileAttributes>,
}

/// A validated operation, as carried through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Copy { source: PathBuf, target: PathBuf, overwrite: bool },
    Move { source: PathBuf, target: PathBuf, overwrite: bool },
    Rename { source: PathBuf, target: PathBuf },
    Delete { path: PathBuf },
    DeleteAll { directory: PathBuf },
    Decompress { source: PathBuf, target: PathBuf },
    Concatenate { source1: PathBuf, source2: PathBuf, target: PathBuf },
    CreateDirectory { path: PathBuf },
    DeleteDirectory { path: PathBuf },
    SetPermissions { path: PathBuf, mode: u32 },
    GetFileInfo { path: PathBuf, crc: CrcRequest, snapshot: FileSnapshot },
    DirListToPacket { directory: PathBuf, offset: u32, query_stats: bool },
    DirListToFile { directory: PathBuf, output: PathBuf, query_stats: bool },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Copy { .. } => OperationKind::Copy,
            Operation::Move { .. } => OperationKind::Move,
            Operation::Rename { .. } => OperationKind::Rename,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::DeleteAll { .. } => OperationKind::DeleteAll,
            Operation::Decompress { .. } => OperationKind::Decompress,
            Operation::Concatenate { .. } => OperationKind::Concatenate,
            Operation::CreateDirectory { .. } => OperationKind::CreateDirectory,
            Operation::DeleteDirectory { .. } => OperationKind::DeleteDirectory,
            Operation::SetPermissions { .. } => OperationKind::SetPermissions,
            Operation::GetFileInfo { .. } => OperationKind::GetFileInfo,
            Operation::DirListToPacket { .. } => OperationKind::DirListToPacket,
            Operation::DirListToFile { .. } => OperationKind::DirListToFile,
        }
    }

    /// First path argument, for log fields.
    pub fn primary_path(&self) -> &Path {
        match self {
            Operation::Copy { source, .. }
            | Operation::Move { source, .. }
            | Operation::Rename { source, .. }
            | Operation::Decompress { source, .. } => source,
            Operation::Concatenate { source1, .. } => source1,
            Operation::Delete { path }
            | Operation::CreateDirectory { path }
            | Operation::DeleteDirectory { path }
            | Operation::SetPermissions { path, .. }
            | Operation::GetFileInfo { path, .. } => path,
            Operation::DeleteAll { directory }
            | Operation::DirListToPacket { directory, .. }
            | Operation::DirListToFile { directory, .. } => directory,
        }
    }
}

/// One slot of the handshake queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub sequence: u64,
    pub operation: Operation,
}
