//! Decompression codecs.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;

/// Expand `source` into a newly created `target`. Returns bytes written.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, source: &Path, target: &Path) -> io::Result<u64>;
}

/// gzip (RFC 1952) decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipCodec;

impl Decompressor for GzipCodec {
    fn decompress(&self, source: &Path, target: &Path) -> io::Result<u64> {
        let input = File::open(source)?;
        let mut decoder = GzDecoder::new(BufReader::new(input));
        let out = OpenOptions::new().write(true).create_new(true).open(target)?;
        let mut writer = BufWriter::new(out);
        let bytes = io::copy(&mut decoder, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(bytes)
    }
}
