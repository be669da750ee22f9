//! Checksums for Get File Info.
//!
//! The selector byte on a request picks the algorithm: 0 = none, 1 = CRC-8
//! (poly 0x07), 2 = CRC-16/ARC, 3 = CRC-32 (IEEE, via crc32fast). Anything else
//! is carried through as `Unrecognized` so the worker can report it.

use std::fs::File;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::engine::yield_point::CooperativeYield;
use crate::errors::OpError;
use crate::fs_ops::io_copy::{LoopTuning, for_each_chunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrcAlgorithm {
    Crc8,
    Crc16,
    Crc32,
}

impl CrcAlgorithm {
    pub fn selector(self) -> u8 {
        match self {
            CrcAlgorithm::Crc8 => 1,
            CrcAlgorithm::Crc16 => 2,
            CrcAlgorithm::Crc32 => 3,
        }
    }
}

/// Decoded selector byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcRequest {
    Ignore,
    Algorithm(CrcAlgorithm),
    Unrecognized(u8),
}

impl CrcRequest {
    pub fn from_selector(value: u8) -> Self {
        match value {
            0 => CrcRequest::Ignore,
            1 => CrcRequest::Algorithm(CrcAlgorithm::Crc8),
            2 => CrcRequest::Algorithm(CrcAlgorithm::Crc16),
            3 => CrcRequest::Algorithm(CrcAlgorithm::Crc32),
            other => CrcRequest::Unrecognized(other),
        }
    }
}

enum CrcState {
    Crc8(u8),
    Crc16(u16),
    Crc32(crc32fast::Hasher),
}

/// Incremental checksum over any of the supported algorithms.
pub struct Crc {
    state: CrcState,
}

impl Crc {
    pub fn new(algorithm: CrcAlgorithm) -> Self {
        let state = match algorithm {
            CrcAlgorithm::Crc8 => CrcState::Crc8(0),
            CrcAlgorithm::Crc16 => CrcState::Crc16(0),
            CrcAlgorithm::Crc32 => CrcState::Crc32(crc32fast::Hasher::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.state {
            CrcState::Crc8(crc) => {
                for &b in bytes {
                    *crc ^= b;
                    for _ in 0..8 {
                        *crc = if *crc & 0x80 != 0 { (*crc << 1) ^ 0x07 } else { *crc << 1 };
                    }
                }
            }
            CrcState::Crc16(crc) => {
                for &b in bytes {
                    *crc ^= b as u16;
                    for _ in 0..8 {
                        *crc = if *crc & 1 != 0 { (*crc >> 1) ^ 0xA001 } else { *crc >> 1 };
                    }
                }
            }
            CrcState::Crc32(hasher) => hasher.update(bytes),
        }
    }

    pub fn finalize(self) -> u32 {
        match self.state {
            CrcState::Crc8(crc) => crc as u32,
            CrcState::Crc16(crc) => crc as u32,
            CrcState::Crc32(hasher) => hasher.finalize(),
        }
    }
}

/// One-shot checksum of an in-memory buffer.
pub fn checksum(algorithm: CrcAlgorithm, bytes: &[u8]) -> u32 {
    let mut crc = Crc::new(algorithm);
    crc.update(bytes);
    crc.finalize()
}

/// Why a file CRC could not be produced. Both cases are warnings, not failures.
#[derive(Debug, Error)]
pub enum CrcScanError {
    #[error("cannot open '{}' for CRC: {source}", .path.display())]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CRC read failed: {0}")]
    Read(#[source] OpError),
}

/// Checksum a file chunk by chunk, yielding on the usual cadence.
pub fn file_crc(
    path: &Path,
    algorithm: CrcAlgorithm,
    tuning: LoopTuning,
    yielder: &dyn CooperativeYield,
) -> Result<u32, CrcScanError> {
    let mut file = File::open(path).map_err(|source| CrcScanError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut crc = Crc::new(algorithm);
    for_each_chunk(&mut file, path, tuning, yielder, |chunk| {
        crc.update(chunk);
        Ok(())
    })
    .map_err(CrcScanError::Read)?;
    Ok(crc.finalize())
}
