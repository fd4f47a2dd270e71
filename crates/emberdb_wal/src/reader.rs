//! Streaming record reader.
//!
//! [`LogReader`] walks WAL records segment by segment using its own
//! read-only handles, yielding one record at a time in O(1) memory. It is
//! the foundation of both recovery passes and of the offline inspection
//! tools.
//!
//! Scan termination follows the recovery policy: a zero `total_len`, end
//! of file at a header boundary, or a missing next segment end the scan
//! cleanly; a malformed header or CRC mismatch surfaces as an error and
//! stops the iterator.

use crate::dir::list_segments;
use crate::error::{WalError, WalResult};
use crate::record::{compute_crc32, RecordHeader, CRC_SIZE, HEADER_SIZE};
use crate::segment::{segment_file_name, Segment, FIRST_SEGMENT};
use crate::types::WalLocation;
use emberdb_storage::{StorageBackend, StorageError};
use std::path::{Path, PathBuf};

/// Reads and fully validates one record at `location`.
///
/// Returns `Ok(None)` for the tolerated end-of-data conditions (no room
/// for a header, end of file, zero `total_len`) and an error for
/// corruption: a malformed header, a record crossing the segment
/// boundary, or a CRC mismatch.
pub(crate) fn read_one(
    backend: &dyn StorageBackend,
    segment_size: u32,
    location: WalLocation,
) -> WalResult<Option<(RecordHeader, Vec<u8>)>> {
    let offset = u64::from(location.offset);
    if offset + HEADER_SIZE as u64 > u64::from(segment_size) {
        return Ok(None);
    }

    let header_bytes = match backend.read_at(offset, HEADER_SIZE) {
        Ok(bytes) => bytes,
        Err(StorageError::ReadPastEnd { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let total_len = u32::from_le_bytes([
        header_bytes[0],
        header_bytes[1],
        header_bytes[2],
        header_bytes[3],
    ]);
    if total_len == 0 {
        // End of written data in this segment
        return Ok(None);
    }

    let header = RecordHeader::decode(&header_bytes)?;
    header.validate(segment_size)?;
    if offset + u64::from(header.total_len) > u64::from(segment_size) {
        return Err(WalError::corruption(format!(
            "record at {location} extends past the segment boundary"
        )));
    }

    let record = match backend.read_at(offset, header.total_len as usize) {
        Ok(bytes) => bytes,
        Err(StorageError::ReadPastEnd { .. }) => {
            return Err(WalError::corruption(format!(
                "record at {location} is truncated"
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let crc_at = record.len() - CRC_SIZE;
    let expected = u32::from_le_bytes([
        record[crc_at],
        record[crc_at + 1],
        record[crc_at + 2],
        record[crc_at + 3],
    ]);
    let actual = compute_crc32(&record[..crc_at]);
    if expected != actual {
        return Err(WalError::ChecksumMismatch {
            location,
            expected,
            actual,
        });
    }

    let payload = record[HEADER_SIZE..HEADER_SIZE + header.data_len as usize].to_vec();
    Ok(Some((header, payload)))
}

/// A record yielded by a log scan.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Where the record starts.
    pub location: WalLocation,
    /// The decoded header.
    pub header: RecordHeader,
    /// The record payload.
    pub payload: Vec<u8>,
}

/// A read-only view of a WAL directory.
///
/// Opens its own read-only segment handles; it neither takes the writer
/// lock nor moves the write position, so it can inspect a live log.
#[derive(Debug)]
pub struct LogReader {
    wal_dir: PathBuf,
    segment_size: u32,
    segments: Vec<u32>,
}

impl LogReader {
    /// Opens a reader over a WAL directory.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the path is not a directory.
    pub fn open(wal_dir: impl AsRef<Path>, segment_size: u32) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref();
        if !wal_dir.is_dir() {
            return Err(WalError::DirectoryUnavailable {
                path: wal_dir.to_path_buf(),
            });
        }

        let segments = list_segments(wal_dir)?;
        Ok(Self {
            wal_dir: wal_dir.to_path_buf(),
            segment_size,
            segments,
        })
    }

    /// Segment numbers present when the reader was opened, sorted.
    #[must_use]
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// The highest segment number present, or 0 for an empty directory.
    #[must_use]
    pub fn max_segment(&self) -> u32 {
        self.segments.last().copied().unwrap_or(0)
    }

    /// Path of the file for segment `num`.
    #[must_use]
    pub fn segment_path(&self, num: u32) -> PathBuf {
        self.wal_dir.join(segment_file_name(num))
    }

    /// Iterates every record from the beginning of the log.
    #[must_use]
    pub fn iter(&self) -> RecordIter<'_> {
        self.iter_from(WalLocation::new(FIRST_SEGMENT, 0), WalLocation::UNSET)
    }

    /// Iterates records in `[start, end)`.
    ///
    /// An unset `start` means the beginning of the log; an unset `end`
    /// means no bound.
    #[must_use]
    pub fn iter_from(&self, start: WalLocation, end: WalLocation) -> RecordIter<'_> {
        let start = if start.is_unset() {
            WalLocation::new(FIRST_SEGMENT, 0)
        } else {
            start
        };

        RecordIter {
            reader: self,
            segment: None,
            segment_num: start.segment,
            offset: start.offset,
            end,
            finished: false,
        }
    }
}

/// Streaming iterator over WAL records.
///
/// Yields `Err` once on corruption, then stops.
pub struct RecordIter<'a> {
    reader: &'a LogReader,
    segment: Option<Segment>,
    segment_num: u32,
    offset: u32,
    end: WalLocation,
    finished: bool,
}

impl RecordIter<'_> {
    /// The position the scan stopped at; the start of the record that
    /// failed when the iterator has yielded an error.
    #[must_use]
    pub fn position(&self) -> WalLocation {
        WalLocation::new(self.segment_num, self.offset)
    }
}

impl Iterator for RecordIter<'_> {
    type Item = WalResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let location = WalLocation::new(self.segment_num, self.offset);
            if !self.end.is_unset() && location >= self.end {
                self.finished = true;
                return None;
            }

            if self.segment.is_none() {
                if self.segment_num > self.reader.max_segment() {
                    self.finished = true;
                    return None;
                }

                let path = self.reader.segment_path(self.segment_num);
                match Segment::open_read_only(&path, self.segment_num, self.reader.segment_size) {
                    Ok(segment) => self.segment = Some(segment),
                    Err(WalError::SegmentNotFound { .. }) => {
                        // A gap in the segment chain is the end of the log
                        self.finished = true;
                        return None;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            let Some(segment) = self.segment.as_ref() else {
                self.finished = true;
                return None;
            };

            match read_one(segment.backend(), self.reader.segment_size, location) {
                Ok(Some((header, payload))) => {
                    self.offset += header.total_len;
                    return Some(Ok(ScannedRecord {
                        location,
                        header,
                        payload,
                    }));
                }
                Ok(None) => {
                    // Clean end of this segment; move to the next
                    self.segment = None;
                    self.segment_num += 1;
                    self.offset = 0;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
