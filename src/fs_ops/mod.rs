//! Filesystem primitives used by the operation handlers.

pub mod codec;
pub mod crc;
pub mod helpers;
pub mod io_copy;
pub mod util;

pub use codec::{Decompressor, GzipCodec};
pub use crc::{CrcAlgorithm, CrcRequest};
pub use io_copy::LoopTuning;
pub use util::FileAttributes;
