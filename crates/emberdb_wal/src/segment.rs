//! WAL segment file management.
//!
//! Each segment is a fixed-size, preallocated file holding a contiguous
//! run of records. Segments are named from their 32-bit number split into
//! three zero-padded hex fields: `00000000_00000000_00000001`.

use crate::error::{WalError, WalResult};
use crate::record::{RecordHeader, HEADER_SIZE};
use emberdb_storage::{FileBackend, StorageBackend};
use std::fmt;
use std::path::Path;

/// Default segment size (16 MiB).
pub const DEFAULT_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;

/// The first segment number allocated in a fresh directory.
///
/// Segment numbers are dense from here; 0 is reserved to mean "none".
pub const FIRST_SEGMENT: u32 = 1;

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Created but not yet written.
    Empty,
    /// The segment currently accepting appends. Exactly one at a time.
    Active,
    /// No further records fit; a successor segment has been allocated.
    Full,
    /// Shipped out of the live directory. Reserved for log shipping.
    Archived,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Active => "active",
            Self::Full => "full",
            Self::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Builds the file name for segment `num`.
///
/// The number is split with bit-shifts into `hi = n >> 32`,
/// `mid = (n >> 16) & 0xFFFF`, `lo = n & 0xFFFF`, each printed as a
/// zero-padded 8-digit uppercase hex field.
#[must_use]
pub fn segment_file_name(num: u32) -> String {
    let n = u64::from(num);
    format!(
        "{:08X}_{:08X}_{:08X}",
        n >> 32,
        (n >> 16) & 0xFFFF,
        n & 0xFFFF
    )
}

/// Parses a segment file name back to its segment number.
///
/// Accepts any name of three `_`-joined hex fields whose combined value
/// fits a 32-bit segment number. Returns `None` for anything else.
pub(crate) fn parse_segment_file_name(name: &str) -> Option<u32> {
    let mut fields = name.split('_');
    let hi = u64::from_str_radix(fields.next()?, 16).ok()?;
    let mid = u64::from_str_radix(fields.next()?, 16).ok()?;
    let lo = u64::from_str_radix(fields.next()?, 16).ok()?;
    if fields.next().is_some() {
        return None;
    }

    let num = (hi << 32) | (mid << 16) | lo;
    u32::try_from(num).ok()
}

/// Scans a segment's records to find the end of written data.
///
/// Walks headers from offset 0 until a zero `total_len`, an invalid
/// header, or the segment boundary. Returns the first free offset and the
/// start of the last valid record, if any.
pub(crate) fn find_write_offset(
    backend: &dyn StorageBackend,
    segment_size: u32,
) -> WalResult<(u32, Option<u32>)> {
    let limit = backend.len()?.min(u64::from(segment_size));
    let mut offset: u32 = 0;
    let mut last_start = None;

    loop {
        let pos = u64::from(offset);
        if pos + HEADER_SIZE as u64 > limit {
            break;
        }

        let bytes = backend.read_at(pos, HEADER_SIZE)?;
        let total_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if total_len == 0 {
            break;
        }

        let Ok(header) = RecordHeader::decode(&bytes) else {
            break;
        };
        if header.validate(segment_size).is_err() || pos + u64::from(header.total_len) > limit {
            break;
        }

        last_start = Some(offset);
        offset += header.total_len;
    }

    Ok((offset, last_start))
}

/// A WAL segment file.
///
/// Owns its storage handle. The write offset is monotonically
/// non-decreasing and always points at the position where the next header
/// may begin, or equals the segment size once the segment is full.
pub(crate) struct Segment {
    num: u32,
    state: SegmentState,
    size: u32,
    write_offset: u32,
    backend: Box<dyn StorageBackend>,
}

impl Segment {
    /// Creates and preallocates a new segment file.
    ///
    /// The file is sized to exactly `size` bytes up front; sparse
    /// preallocation is acceptable. State goes `Empty → Active`.
    pub fn create(path: &Path, num: u32, size: u32) -> WalResult<Self> {
        let mut backend = FileBackend::open(path)?;
        backend.set_len(u64::from(size))?;

        let mut segment = Self {
            num,
            state: SegmentState::Empty,
            size,
            write_offset: 0,
            backend: Box::new(backend),
        };
        segment.state = SegmentState::Active;
        Ok(segment)
    }

    /// Opens an existing segment read-write and positions at its tail.
    ///
    /// Returns the segment and the start offset of its last record, if it
    /// holds any.
    pub fn open_at_tail(path: &Path, num: u32, size: u32) -> WalResult<(Self, Option<u32>)> {
        let mut backend = FileBackend::open(path)?;
        if backend.len()? < u64::from(size) {
            // Interrupted preallocation; restore the fixed length
            backend.set_len(u64::from(size))?;
        }

        let (write_offset, last_start) = find_write_offset(&backend, size)?;

        Ok((
            Self {
                num,
                state: SegmentState::Active,
                size,
                write_offset,
                backend: Box::new(backend),
            },
            last_start,
        ))
    }

    /// Opens a segment read-only.
    ///
    /// A missing file is reported as `SegmentNotFound`.
    pub fn open_read_only(path: &Path, num: u32, size: u32) -> WalResult<Self> {
        let backend = FileBackend::open_read_only(path).map_err(|e| {
            if e.is_not_found() {
                WalError::SegmentNotFound { segment: num }
            } else {
                WalError::Storage(e)
            }
        })?;

        Ok(Self {
            num,
            state: SegmentState::Full,
            size,
            write_offset: 0,
            backend: Box::new(backend),
        })
    }

    /// Wraps an arbitrary backend as an active segment, for tests.
    #[cfg(test)]
    pub fn from_backend(num: u32, size: u32, mut backend: Box<dyn StorageBackend>) -> Self {
        backend.set_len(u64::from(size)).expect("preallocate");
        Self {
            num,
            state: SegmentState::Active,
            size,
            write_offset: 0,
            backend,
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn write_offset(&self) -> u32 {
        self.write_offset
    }

    /// Returns true if a record of `len` bytes fits at the current offset.
    pub fn has_space(&self, len: u32) -> bool {
        u64::from(self.write_offset) + u64::from(len) <= u64::from(self.size)
    }

    /// Marks the segment full. The offset saturates at the segment size.
    pub fn mark_full(&mut self) {
        self.state = SegmentState::Full;
        self.write_offset = self.size;
    }

    /// Advances the write offset past a just-written record.
    pub fn advance(&mut self, len: u32) {
        self.write_offset += len;
    }

    pub fn write_at(&mut self, offset: u32, data: &[u8]) -> WalResult<()> {
        self.backend.write_at(u64::from(offset), data)?;
        Ok(())
    }

    pub fn read_at(&self, offset: u32, len: usize) -> WalResult<Vec<u8>> {
        Ok(self.backend.read_at(u64::from(offset), len)?)
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn sync(&mut self) -> WalResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    pub fn sync_data(&mut self) -> WalResult<()> {
        self.backend.sync_data()?;
        Ok(())
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("num", &self.num)
            .field("state", &self.state)
            .field("size", &self.size)
            .field("write_offset", &self.write_offset)
            .finish_non_exhaustive()
    }
}
