//! Chunked streaming copy with cooperative yields.
//!
//! Every loop here reads at most `chunk_size` bytes per iteration and ticks a
//! [`YieldBudget`] after each non-empty chunk, so a copy of `(L + 1) * chunk_size`
//! bytes with `yield_every = L` yields exactly once.
//!
//! Snapshot semantics: the source is read once from start to EOF; bytes appended
//! concurrently may or may not be included.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::engine::yield_point::{CooperativeYield, YieldBudget};
use crate::errors::OpError;

/// Chunk size and yield cadence shared by every long-running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTuning {
    pub chunk_size: usize,
    pub yield_every: u32,
}

impl Default for LoopTuning {
    fn default() -> Self {
        Self {
            chunk_size: 2048,
            yield_every: 16,
        }
    }
}

/// Feed `reader` to `sink` chunk by chunk. Returns the number of bytes read.
pub fn for_each_chunk<R, F>(
    reader: &mut R,
    reader_path: &Path,
    tuning: LoopTuning,
    yielder: &dyn CooperativeYield,
    mut sink: F,
) -> Result<u64, OpError>
where
    R: Read + ?Sized,
    F: FnMut(&[u8]) -> Result<(), OpError>,
{
    let mut buf = vec![0u8; tuning.chunk_size.max(1)];
    let mut budget = YieldBudget::new(yielder, tuning.yield_every);
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(OpError::io("read", reader_path)(e)),
        };
        sink(&buf[..n])?;
        total += n as u64;
        budget.tick();
    }
    Ok(total)
}

/// Copy `src` to `dst`. Without `overwrite` the destination is created with
/// `create_new`, so an existing target is never clobbered.
pub fn copy_chunked(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    tuning: LoopTuning,
    yielder: &dyn CooperativeYield,
) -> Result<u64, OpError> {
    let mut src_f = File::open(src).map_err(OpError::io("open", src))?;

    let mut opts = OpenOptions::new();
    opts.write(true);
    if overwrite {
        // Truncate only after ruling out src and dst being one file.
        opts.create(true);
    } else {
        opts.create_new(true);
    }
    let mut dst_f = opts.open(dst).map_err(OpError::io("create", dst))?;
    if overwrite {
        if same_file(&src_f, src, &dst_f, dst) {
            return Err(OpError::SameFile {
                input: src.to_path_buf(),
                output: dst.to_path_buf(),
            });
        }
        dst_f.set_len(0).map_err(OpError::io("truncate", dst))?;
    }

    let bytes = pump(&mut src_f, src, &mut dst_f, dst, tuning, yielder)?;

    // Carry the permission bits across, like fs::copy does. Not fatal if refused.
    if let Ok(meta) = src_f.metadata() {
        let _ = fs::set_permissions(dst, meta.permissions());
    }
    dst_f.sync_all().map_err(OpError::io("fsync", dst))?;
    Ok(bytes)
}

#[cfg(unix)]
fn same_file(a: &File, _a_path: &Path, b: &File, _b_path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (a.metadata(), b.metadata()) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_a: &File, a_path: &Path, _b: &File, b_path: &Path) -> bool {
    match (dunce::canonicalize(a_path), dunce::canonicalize(b_path)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Append the contents of `src` to the existing file `dst`.
pub fn append_chunked(
    src: &Path,
    dst: &Path,
    tuning: LoopTuning,
    yielder: &dyn CooperativeYield,
) -> Result<u64, OpError> {
    let mut src_f = File::open(src).map_err(OpError::io("open", src))?;
    let mut dst_f = OpenOptions::new()
        .append(true)
        .open(dst)
        .map_err(OpError::io("open", dst))?;
    let bytes = pump(&mut src_f, src, &mut dst_f, dst, tuning, yielder)?;
    dst_f.sync_all().map_err(OpError::io("fsync", dst))?;
    Ok(bytes)
}

fn pump(
    reader: &mut File,
    reader_path: &Path,
    writer: &mut File,
    writer_path: &Path,
    tuning: LoopTuning,
    yielder: &dyn CooperativeYield,
) -> Result<u64, OpError> {
    for_each_chunk(reader, reader_path, tuning, yielder, |chunk| {
        write_exact(writer, writer_path, chunk)
    })
}

/// Single `write` call; anything other than a full write is a failure.
pub(crate) fn write_exact(writer: &mut dyn Write, path: &Path, bytes: &[u8]) -> Result<(), OpError> {
    let written = writer.write(bytes).map_err(OpError::io("write", path))?;
    if written != bytes.len() {
        return Err(OpError::ShortWrite {
            path: path.to_path_buf(),
            written,
            expected: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::yield_point::testing::CountingYield;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn tuning(chunk_size: usize, yield_every: u32) -> LoopTuning {
        LoopTuning {
            chunk_size,
            yield_every,
        }
    }

    #[test]
    fn copy_small_file_ok() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"hello world").unwrap();

        let y = CountingYield::default();
        let n = copy_chunked(&src, &dst, false, LoopTuning::default(), &y).unwrap();
        assert_eq!(n, 11);
        assert_eq!(fs::read(&dst).unwrap(), b"hello world");
    }

    #[test]
    fn copy_zero_length_ok() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("empty");
        let dst = dir.path().join("out");
        File::create(&src).unwrap();

        let y = CountingYield::default();
        let n = copy_chunked(&src, &dst, false, LoopTuning::default(), &y).unwrap();
        assert_eq!(n, 0);
        assert_eq!(fs::metadata(&dst).unwrap().len(), 0);
        assert_eq!(y.count(), 0);
    }

    #[test]
    fn fails_if_dest_exists_without_overwrite() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"data").unwrap();
        fs::write(&dst, b"x").unwrap();

        let y = CountingYield::default();
        let err = copy_chunked(&src, &dst, false, LoopTuning::default(), &y).unwrap_err();
        assert!(matches!(err, OpError::Io { primitive: "create", .. }));
        assert_eq!(fs::read(&dst).unwrap(), b"x");
    }

    #[test]
    fn overwrite_truncates_existing_target() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"ab").unwrap();
        fs::write(&dst, b"longer content").unwrap();

        let y = CountingYield::default();
        copy_chunked(&src, &dst, true, LoopTuning::default(), &y).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"ab");
    }

    #[test]
    fn overwrite_onto_itself_is_refused_and_keeps_data() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("same");
        fs::write(&f, b"payload!").unwrap();

        let y = CountingYield::default();
        let err = copy_chunked(&f, &f, true, LoopTuning::default(), &y).unwrap_err();
        assert!(matches!(err, OpError::SameFile { .. }));
        assert_eq!(fs::read(&f).unwrap(), b"payload!");
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_through_hard_link_is_refused() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("orig");
        let link = dir.path().join("link");
        fs::write(&f, b"payload!").unwrap();
        fs::hard_link(&f, &link).unwrap();

        let y = CountingYield::default();
        let err = copy_chunked(&f, &link, true, LoopTuning::default(), &y).unwrap_err();
        assert!(matches!(err, OpError::SameFile { .. }));
        assert_eq!(fs::read(&f).unwrap(), b"payload!");
    }

    #[test]
    fn one_chunk_past_budget_yields_once() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("big.bin");
        let dst = dir.path().join("big.out");
        let data: Vec<u8> = (0..(5 * 64)).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &data).unwrap();

        let y = CountingYield::default();
        let n = copy_chunked(&src, &dst, false, tuning(64, 4), &y).unwrap();
        assert_eq!(n as usize, data.len());
        assert_eq!(y.count(), 1);
        assert_eq!(fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn append_extends_target() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"head-").unwrap();
        fs::write(&b, b"tail").unwrap();

        let y = CountingYield::default();
        append_chunked(&b, &a, tuning(3, 1), &y).unwrap();
        assert_eq!(fs::read(&a).unwrap(), b"head-tail");
        assert_eq!(y.count(), 2);
    }

    #[test]
    fn sink_error_stops_the_loop() {
        let y = CountingYield::default();
        let mut reader = Cursor::new(vec![1u8; 10]);
        let mut calls = 0;
        let err = for_each_chunk(&mut reader, Path::new("mem"), tuning(2, 1), &y, |_| {
            calls += 1;
            Err(OpError::NotEmpty("x".into()))
        })
        .unwrap_err();
        assert!(matches!(err, OpError::NotEmpty(_)));
        assert_eq!(calls, 1);
    }

    struct HalfWriter;
    impl Write for HalfWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len() / 2)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_is_reported() {
        let err = write_exact(&mut HalfWriter, Path::new("out"), &[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            OpError::ShortWrite {
                written: 4,
                expected: 8,
                ..
            }
        ));
    }
}
