//! On-disk directory listing format.
//!
//! All integers little-endian. Layout:
//!
//! ```text
//! header   64 bytes   magic "FMDL", version, subtype, header length,
//!                     created (unix secs, u64), name field width, reserved,
//!                     32-byte NUL-padded description
//! stats    W + 8      directory name [W], dir_entries u32, file_entries u32
//! rows     W + 16     name [W], size u64, mtime u32, mode u32   (file_entries times)
//! ```
//!
//! `W` is the name field width recorded in the header. Names are NUL-padded and
//! truncated to `W - 1` bytes so there is always a terminator.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

pub const LISTING_MAGIC: [u8; 4] = *b"FMDL";
pub const LISTING_VERSION: u32 = 1;
pub const LISTING_SUBTYPE: u32 = 1;
pub const HEADER_LEN: usize = 64;
const DESCRIPTION_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("read listing: {0}")]
    Io(#[from] io::Error),

    #[error("not a directory listing (bad magic)")]
    BadMagic,

    #[error("unsupported listing version {0}")]
    UnsupportedVersion(u32),

    #[error("listing truncated at {section}")]
    Truncated { section: &'static str },
}

/// One directory entry as it appears in packets and listing files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub size: u64,
    pub mtime: u32,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingHeader {
    pub version: u32,
    pub subtype: u32,
    pub created: u64,
    pub name_width: u32,
    pub description: String,
}

impl ListingHeader {
    pub fn new(name_width: usize, description: &str) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: LISTING_VERSION,
            subtype: LISTING_SUBTYPE,
            created,
            name_width: name_width as u32,
            description: description.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&LISTING_MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.subtype.to_le_bytes());
        out.extend_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&self.created.to_le_bytes());
        out.extend_from_slice(&self.name_width.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        put_name(&mut out, &self.description, DESCRIPTION_LEN);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, ListingError> {
        let mut r = Reader::new(bytes, "header");
        if r.take(4)? != LISTING_MAGIC {
            return Err(ListingError::BadMagic);
        }
        let version = r.u32()?;
        if version != LISTING_VERSION {
            return Err(ListingError::UnsupportedVersion(version));
        }
        let subtype = r.u32()?;
        let _header_len = r.u32()?;
        let created = r.u64()?;
        let name_width = r.u32()?;
        let _reserved = r.u32()?;
        let description = r.name(DESCRIPTION_LEN)?;
        Ok(Self {
            version,
            subtype,
            created,
            name_width,
            description,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingStats {
    pub directory: String,
    /// Every entry seen in the directory.
    pub dir_entries: u32,
    /// Rows actually written.
    pub file_entries: u32,
}

impl ListingStats {
    pub fn encode(&self, name_width: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(name_width + 8);
        put_name(&mut out, &self.directory, name_width);
        out.extend_from_slice(&self.dir_entries.to_le_bytes());
        out.extend_from_slice(&self.file_entries.to_le_bytes());
        out
    }
}

impl ListingEntry {
    pub fn encode(&self, name_width: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(name_width + 16);
        put_name(&mut out, &self.name, name_width);
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&self.mode.to_le_bytes());
        out
    }
}

/// A listing file read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingFile {
    pub header: ListingHeader,
    pub stats: ListingStats,
    pub rows: Vec<ListingEntry>,
}

impl ListingFile {
    pub fn read(path: &Path) -> Result<Self, ListingError> {
        Self::parse(&fs::read(path)?)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ListingError> {
        if bytes.len() < HEADER_LEN {
            return Err(ListingError::Truncated { section: "header" });
        }
        let header = ListingHeader::decode(&bytes[..HEADER_LEN])?;
        let w = header.name_width as usize;

        let mut r = Reader::new(&bytes[HEADER_LEN..], "stats");
        let stats = ListingStats {
            directory: r.name(w)?,
            dir_entries: r.u32()?,
            file_entries: r.u32()?,
        };

        r.section = "rows";
        let mut rows = Vec::with_capacity(stats.file_entries as usize);
        for _ in 0..stats.file_entries {
            rows.push(ListingEntry {
                name: r.name(w)?,
                size: r.u64()?,
                mtime: r.u32()?,
                mode: r.u32()?,
            });
        }
        Ok(Self {
            header,
            stats,
            rows,
        })
    }
}

fn put_name(out: &mut Vec<u8>, name: &str, width: usize) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(width.saturating_sub(1));
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], section: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            section,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ListingError> {
        let end = self.pos + n;
        let bytes: &'a [u8] = self.bytes;
        let slice = bytes
            .get(self.pos..end)
            .ok_or(ListingError::Truncated {
                section: self.section,
            })?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ListingError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, ListingError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn name(&mut self, width: usize) -> Result<String, ListingError> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}
