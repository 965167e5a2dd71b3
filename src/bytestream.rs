//! Byte-stream bridge between random-access storage and the pipeline.
//!
//! The demultiplexing pipeline pulls bytes on its own threads; the consumer
//! hands the adapter a [`ByteStorage`] object. The [`ByteStreamCursor`] sits
//! between the two, translating pipeline-issued `(offset, length)` reads
//! into seek/read calls and answering the pipeline's length, seekability,
//! and scheduling queries.
//!
//! Two storage implementations ship with the crate: [`FileStorage`] for
//! on-disk containers and [`MemoryStorage`] for in-memory ones.

use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Fixed-point "100%" answer for length queries in percent units.
pub const PERCENT_MAX: u64 = 1_000_000;

// ============================================================================
// Storage Contract
// ============================================================================

/// Random-access byte storage backing a media container.
///
/// The four operations the adapter needs, nothing more. Implementations are
/// driven from pipeline threads through the cursor's internal lock, so they
/// do not need to be synchronized themselves.
pub trait ByteStorage: Send {
    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes read; fewer than requested is success.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the current position to an absolute byte offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Total length of the storage in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Check whether the current position is at or past the end.
    fn is_eof(&self) -> bool;
}

/// File-backed storage.
pub struct FileStorage {
    file: File,
    position: u64,
    length: u64,
}

impl FileStorage {
    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            position: 0,
            length,
        })
    }
}

impl ByteStorage for FileStorage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.length)
    }

    fn is_eof(&self) -> bool {
        self.position >= self.length
    }
}

/// In-memory storage, used mostly by tests and small embedded containers.
pub struct MemoryStorage {
    data: Bytes,
    position: u64,
}

impl MemoryStorage {
    /// Create storage over an in-memory byte buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

impl ByteStorage for MemoryStorage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.position = offset;
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn is_eof(&self) -> bool {
        self.position >= self.data.len() as u64
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Outcome of a pipeline-issued read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were read; may be fewer than requested.
    Data(Bytes),
    /// The storage is at end-of-input; no bytes will follow.
    Eos,
}

/// Unit the pipeline asks for the stream length in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    /// Plain byte count.
    Bytes,
    /// Fixed-point percentage (answered with [`PERCENT_MAX`]).
    Percent,
    /// Wall-clock duration. The bridge cannot convert bytes to time.
    Time,
}

/// Data-flow scheduling mode a pipeline may ask to activate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingMode {
    /// The pipeline pulls ranges on demand. The only supported mode.
    Pull,
    /// The bridge would push data downstream. Not supported.
    Push,
}

/// Answer to a seekability query: always the full byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekRange {
    /// Whether seeking is possible at all.
    pub seekable: bool,
    /// First seekable byte offset.
    pub start: u64,
    /// One past the last seekable byte offset.
    pub end: u64,
}

/// Stateless protocol adapter the pipeline reads the container through.
///
/// All calls arrive on pipeline-owned threads; the cursor serializes access
/// to the underlying storage with its own lock and never calls back into
/// the pipeline.
pub struct ByteStreamCursor {
    storage: Mutex<Box<dyn ByteStorage>>,
}

impl ByteStreamCursor {
    /// Wrap a storage object.
    pub fn new(storage: Box<dyn ByteStorage>) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Service a pipeline read of `len` bytes.
    ///
    /// With an explicit `offset` the storage is repositioned first; a seek
    /// failure is a hard I/O failure. Storage already at end-of-input yields
    /// [`ReadOutcome::Eos`] rather than a zero-length success. A partial
    /// read is success with the buffer sized to the actual count.
    pub fn pull(&self, offset: Option<u64>, len: usize) -> Result<ReadOutcome> {
        let mut storage = self.storage.lock().unwrap();

        if let Some(offset) = offset {
            storage.seek(offset)?;
        }

        if storage.is_eof() {
            return Ok(ReadOutcome::Eos);
        }

        let mut buf = vec![0u8; len];
        let n = storage.read(&mut buf)?;
        buf.truncate(n);

        Ok(ReadOutcome::Data(buf.into()))
    }

    /// Answer a length query in the requested unit.
    pub fn length_in(&self, unit: LengthUnit) -> Result<u64> {
        match unit {
            LengthUnit::Bytes => Ok(self.storage.lock().unwrap().len()?),
            LengthUnit::Percent => Ok(PERCENT_MAX),
            LengthUnit::Time => Err(Error::UnsupportedQuery("length in time units")),
        }
    }

    /// Answer a seekability query: the full byte range is always seekable.
    pub fn seekable(&self) -> Result<SeekRange> {
        let end = self.storage.lock().unwrap().len()?;
        Ok(SeekRange {
            seekable: true,
            start: 0,
            end,
        })
    }

    /// Answer a scheduling-mode activation request.
    ///
    /// Only pull mode is supported; push-mode activation is rejected.
    pub fn activate(&self, mode: SchedulingMode) -> bool {
        match mode {
            SchedulingMode::Pull => true,
            SchedulingMode::Push => {
                tracing::warn!("push-mode scheduling requested, rejecting");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cursor(data: &[u8]) -> ByteStreamCursor {
        ByteStreamCursor::new(Box::new(MemoryStorage::new(data.to_vec())))
    }

    #[test]
    fn test_pull_at_offset() {
        let cursor = cursor(b"0123456789");
        match cursor.pull(Some(4), 3).unwrap() {
            ReadOutcome::Data(data) => assert_eq!(&data[..], b"456"),
            ReadOutcome::Eos => panic!("unexpected EOS"),
        }
    }

    #[test]
    fn test_pull_at_current_position_advances() {
        let cursor = cursor(b"abcdef");
        let ReadOutcome::Data(first) = cursor.pull(None, 3).unwrap() else {
            panic!("unexpected EOS");
        };
        let ReadOutcome::Data(second) = cursor.pull(None, 3).unwrap() else {
            panic!("unexpected EOS");
        };
        assert_eq!(&first[..], b"abc");
        assert_eq!(&second[..], b"def");
    }

    #[test]
    fn test_partial_read_is_success() {
        let cursor = cursor(b"abc");
        match cursor.pull(Some(1), 100).unwrap() {
            ReadOutcome::Data(data) => assert_eq!(&data[..], b"bc"),
            ReadOutcome::Eos => panic!("unexpected EOS"),
        }
    }

    #[test]
    fn test_eos_before_read() {
        let cursor = cursor(b"abc");
        assert!(matches!(
            cursor.pull(Some(3), 10).unwrap(),
            ReadOutcome::Eos
        ));
        // Past the end behaves the same.
        assert!(matches!(
            cursor.pull(Some(100), 10).unwrap(),
            ReadOutcome::Eos
        ));
    }

    #[test]
    fn test_length_queries() {
        let cursor = cursor(b"0123456789");
        assert_eq!(cursor.length_in(LengthUnit::Bytes).unwrap(), 10);
        assert_eq!(cursor.length_in(LengthUnit::Percent).unwrap(), PERCENT_MAX);
        assert!(matches!(
            cursor.length_in(LengthUnit::Time),
            Err(Error::UnsupportedQuery(_))
        ));
    }

    #[test]
    fn test_seekable_full_range() {
        let cursor = cursor(b"0123456789");
        let range = cursor.seekable().unwrap();
        assert!(range.seekable);
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 10);
    }

    #[test]
    fn test_scheduling_modes() {
        let cursor = cursor(b"");
        assert!(cursor.activate(SchedulingMode::Pull));
        assert!(!cursor.activate(SchedulingMode::Push));
    }

    #[test]
    fn test_file_storage() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"file contents here").unwrap();
        temp.flush().unwrap();

        let storage = FileStorage::open(temp.path()).unwrap();
        let cursor = ByteStreamCursor::new(Box::new(storage));

        assert_eq!(cursor.length_in(LengthUnit::Bytes).unwrap(), 18);
        match cursor.pull(Some(5), 8).unwrap() {
            ReadOutcome::Data(data) => assert_eq!(&data[..], b"contents"),
            ReadOutcome::Eos => panic!("unexpected EOS"),
        }
        assert!(matches!(
            cursor.pull(Some(18), 1).unwrap(),
            ReadOutcome::Eos
        ));
    }
}
