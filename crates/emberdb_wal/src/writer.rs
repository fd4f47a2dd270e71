//! The WAL context: append path, checkpoints, and record read-back.

use crate::config::WalConfig;
use crate::dir::WalDir;
use crate::error::{WalError, WalResult};
use crate::reader::read_one;
use crate::record::{compute_crc32, RecordHeader, CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::segment::{Segment, FIRST_SEGMENT};
use crate::types::{RecordType, WalLocation};
use std::path::Path;
use tracing::{debug, warn};

/// The write-ahead log engine.
///
/// A `Wal` owns the active segment, the in-flight record buffer, and the
/// last-written location. It is a **single-writer** handle: the append
/// path takes `&mut self`, and an exclusive lock on the WAL directory
/// keeps other processes out.
///
/// # Two-Phase Append
///
/// Records are appended in two phases so the caller can fill the payload
/// in place without an extra copy:
///
/// ```rust,no_run
/// # use emberdb_wal::{RecordType, Wal};
/// # fn demo(wal: &mut Wal) -> emberdb_wal::WalResult<()> {
/// let payload = wal.begin_record(RecordType::Insert, 17, 5)?;
/// payload.copy_from_slice(b"hello");
/// let location = wal.end_record()?;
/// # let _ = location; Ok(())
/// # }
/// ```
///
/// The payload slot is a loan: its borrow ends at `end_record`, which
/// checksums the record and writes it with a single contiguous write.
/// At most one record is in flight; beginning another discards the
/// unfinished one (and warns, since that usually indicates a bug in the
/// caller).
pub struct Wal {
    config: WalConfig,
    dir: WalDir,
    current: Segment,
    last_write: WalLocation,
    last_checkpoint: WalLocation,
    pending: Option<Vec<u8>>,
    next_segment: u32,
    closed: bool,
}

impl Wal {
    /// Opens a WAL directory with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Wal::open_with_config`].
    pub fn open(wal_dir: impl AsRef<Path>) -> WalResult<Self> {
        Self::open_with_config(wal_dir, WalConfig::default())
    }

    /// Opens a WAL directory.
    ///
    /// Creates the directory if needed and acquires the writer lock. A
    /// fresh directory gets segment 1 preallocated; an existing log is
    /// resumed at its tail - the highest-numbered segment is opened and
    /// its records are walked to find the first free offset, so earlier
    /// records are never clobbered.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the path is not usable as a
    /// directory, `Locked` if another process owns the log, and
    /// `InvalidArgument` for an unusable segment size.
    pub fn open_with_config(wal_dir: impl AsRef<Path>, config: WalConfig) -> WalResult<Self> {
        config.validate()?;
        let dir = WalDir::open(wal_dir.as_ref())?;

        let existing = dir.segments()?;
        let (current, last_write, next_segment) = match existing.last().copied() {
            None => {
                let segment = Segment::create(
                    &dir.segment_path(FIRST_SEGMENT),
                    FIRST_SEGMENT,
                    config.segment_size,
                )?;
                dir.sync_directory()?;
                debug!(segment = FIRST_SEGMENT, "allocated first segment");
                (segment, WalLocation::UNSET, FIRST_SEGMENT + 1)
            }
            Some(max) => {
                let (segment, last_start) =
                    Segment::open_at_tail(&dir.segment_path(max), max, config.segment_size)?;
                let last_write = match last_start {
                    Some(offset) => WalLocation::new(max, offset),
                    None => WalLocation::UNSET,
                };
                debug!(
                    segment = max,
                    offset = segment.write_offset(),
                    "resuming at log tail"
                );
                (segment, last_write, max + 1)
            }
        };

        Ok(Self {
            config,
            dir,
            current,
            last_write,
            last_checkpoint: WalLocation::UNSET,
            pending: None,
            next_segment,
            closed: false,
        })
    }

    /// Begins a new record and returns its payload slot.
    ///
    /// The header is filled with the record type, transaction ID, and a
    /// back-pointer to the last record this writer appended (a
    /// write-order chain, independent of transaction). The returned slice
    /// is exactly `data_len` bytes; write the payload into it, then call
    /// [`Wal::end_record`].
    ///
    /// # Errors
    ///
    /// Returns `Closed` after [`Wal::close`], `PayloadTooLarge` when
    /// `data_len` exceeds the 16-bit record maximum, and
    /// `InvalidArgument` when the record cannot fit in a segment.
    pub fn begin_record(
        &mut self,
        rtype: RecordType,
        xid: u32,
        data_len: usize,
    ) -> WalResult<&mut [u8]> {
        self.ensure_open()?;

        if data_len > MAX_PAYLOAD_SIZE {
            return Err(WalError::PayloadTooLarge {
                len: data_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total_len = HEADER_SIZE + data_len + CRC_SIZE;
        if total_len as u64 > u64::from(self.config.segment_size) {
            return Err(WalError::invalid_argument(format!(
                "record of {total_len} bytes does not fit a {}-byte segment",
                self.config.segment_size
            )));
        }

        if self.pending.is_some() {
            warn!(%rtype, xid, "discarding in-flight record that was never finished");
        }

        let header = RecordHeader::new(rtype, xid, self.last_write, data_len as u16);
        let mut buf = vec![0u8; total_len];
        header.encode_into(&mut buf);

        let buf = self.pending.insert(buf);
        Ok(&mut buf[HEADER_SIZE..HEADER_SIZE + data_len])
    }

    /// Checksums and appends the in-flight record.
    ///
    /// Rolls over to a fresh segment first when the record does not fit
    /// the active one; records never straddle segment boundaries. On
    /// success the record's location is returned and becomes the
    /// back-pointer of the next record.
    ///
    /// On failure the segment offset and last-write location are
    /// unchanged and the record buffer is abandoned; the caller must
    /// begin again.
    ///
    /// # Errors
    ///
    /// Returns `NoRecordInFlight` without a matching `begin_record`, or
    /// the underlying I/O error.
    pub fn end_record(&mut self) -> WalResult<WalLocation> {
        self.ensure_open()?;

        let mut buf = self.pending.take().ok_or(WalError::NoRecordInFlight)?;
        let crc_at = buf.len() - CRC_SIZE;
        let crc = compute_crc32(&buf[..crc_at]);
        buf[crc_at..].copy_from_slice(&crc.to_le_bytes());

        let total_len = buf.len() as u32;
        if !self.current.has_space(total_len) {
            self.roll_segment()?;
        }

        let offset = self.current.write_offset();
        let location = WalLocation::new(self.current.num(), offset);

        self.current.write_at(offset, &buf)?;
        self.current.advance(total_len);
        self.last_write = location;

        Ok(location)
    }

    /// Seals the active segment and allocates its successor.
    fn roll_segment(&mut self) -> WalResult<()> {
        let sealed = self.current.num();
        self.current.mark_full();
        self.current.sync()?;

        let num = self.next_segment;
        let segment = Segment::create(&self.dir.segment_path(num), num, self.config.segment_size)?;
        self.dir.sync_directory()?;

        self.current = segment;
        self.next_segment += 1;
        debug!(sealed, active = num, "rolled over to new segment");
        Ok(())
    }

    /// Forces written records to stable storage.
    ///
    /// With `wait_for_sync` a full sync is issued; without it a data-only
    /// sync is used where the host offers one. Both block until the sync
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn flush(&mut self, wait_for_sync: bool) -> WalResult<()> {
        self.ensure_open()?;
        if wait_for_sync {
            self.current.sync()
        } else {
            self.current.sync_data()
        }
    }

    /// Writes a checkpoint record and makes it durable.
    ///
    /// After this returns, every record whose `end_record` previously
    /// succeeded is on stable storage, as is the checkpoint itself. The
    /// checkpoint's location is remembered and anchors this handle's next
    /// [`Wal::recover`] call.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn checkpoint(&mut self) -> WalResult<()> {
        self.ensure_open()?;
        self.begin_record(RecordType::Checkpoint, 0, 0)?;
        let location = self.end_record()?;
        self.flush(true)?;
        self.last_checkpoint = location;
        debug!(%location, "checkpoint durable");
        Ok(())
    }

    /// Reads the record at `location`, verifying its checksum.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for the unset location,
    /// `SegmentNotFound` if the segment file is gone, `Corruption` if no
    /// valid record starts there, and `ChecksumMismatch` if the stored
    /// CRC does not match the record bytes.
    pub fn read_record(&mut self, location: WalLocation) -> WalResult<(RecordHeader, Vec<u8>)> {
        self.ensure_open()?;

        if location.segment == 0 {
            return Err(WalError::invalid_argument("cannot read the unset location"));
        }

        let segment_size = self.config.segment_size;
        let found = if location.segment == self.current.num() {
            read_one(self.current.backend(), segment_size, location)?
        } else {
            let segment = Segment::open_read_only(
                &self.dir.segment_path(location.segment),
                location.segment,
                segment_size,
            )?;
            read_one(segment.backend(), segment_size, location)?
        };

        found.ok_or_else(|| WalError::corruption(format!("no record at {location}")))
    }

    /// Location of the last successfully appended record.
    ///
    /// [`WalLocation::UNSET`] when nothing has been written yet.
    #[must_use]
    pub fn last_write_location(&self) -> WalLocation {
        self.last_write
    }

    /// Location of the most recent checkpoint written through this handle.
    ///
    /// [`WalLocation::UNSET`] when this handle has not written one.
    /// Recovery anchors its scan here: everything before a checkpoint this
    /// handle wrote is known to be durable and, when the checkpoint came
    /// from a recovery run, already replayed. A checkpoint merely found on
    /// disk carries no such guarantee, so a fresh handle starts unset.
    #[must_use]
    pub fn last_checkpoint_location(&self) -> WalLocation {
        self.last_checkpoint
    }

    /// Location where the next record will start.
    #[must_use]
    pub fn current_location(&self) -> WalLocation {
        WalLocation::new(self.current.num(), self.current.write_offset())
    }

    /// The configured segment size.
    #[must_use]
    pub fn segment_size(&self) -> u32 {
        self.config.segment_size
    }

    /// The WAL directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the WAL.
    ///
    /// Best-effort: a final flush is attempted and failures are logged,
    /// then resources are released unconditionally. Every call after this
    /// fails with `Closed`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the WAL was already closed.
    pub fn close(&mut self) -> WalResult<()> {
        self.ensure_open()?;

        if let Err(e) = self.current.sync() {
            warn!(error = %e, "flush during close failed");
        }
        if self.pending.take().is_some() {
            warn!("discarding in-flight record at close");
        }

        self.closed = true;
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> WalResult<()> {
        if self.closed {
            Err(WalError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.current.sync() {
                warn!(error = %e, "sync while dropping unclosed WAL failed");
            }
        }
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.dir.path())
            .field("segment_size", &self.config.segment_size)
            .field("current", &self.current)
            .field("last_write", &self.last_write)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_wal(path: &Path, segment_size: u32) -> Wal {
        Wal::open_with_config(path, WalConfig::new().segment_size(segment_size)).unwrap()
    }

    fn append(wal: &mut Wal, rtype: RecordType, xid: u32, payload: &[u8]) -> WalLocation {
        let slot = wal.begin_record(rtype, xid, payload.len()).unwrap();
        slot.copy_from_slice(payload);
        wal.end_record().unwrap()
    }

    #[test]
    fn record_roundtrip() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        let location = append(&mut wal, RecordType::Insert, 42, b"row payload");
        let (header, payload) = wal.read_record(location).unwrap();

        assert_eq!(header.rtype, RecordType::Insert);
        assert_eq!(header.xid, 42);
        assert_eq!(header.data_len, 11);
        assert_eq!(payload, b"row payload");
    }

    #[test]
    fn empty_payload_roundtrip() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        let location = append(&mut wal, RecordType::XactCommit, 7, b"");
        let (header, payload) = wal.read_record(location).unwrap();

        assert_eq!(header.rtype, RecordType::XactCommit);
        assert_eq!(header.data_len, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn prev_record_forms_write_order_chain() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        let l1 = append(&mut wal, RecordType::Insert, 1, b"one");
        let l2 = append(&mut wal, RecordType::Update, 2, b"two");
        let l3 = append(&mut wal, RecordType::Delete, 1, b"three");

        // The chain follows append order, not transaction membership
        let (h2, _) = wal.read_record(l2).unwrap();
        let (h3, _) = wal.read_record(l3).unwrap();
        assert_eq!(h2.prev_record, l1);
        assert_eq!(h3.prev_record, l2);

        let (h1, _) = wal.read_record(l1).unwrap();
        assert_eq!(h1.prev_record, WalLocation::UNSET);
    }

    #[test]
    fn begin_discards_unfinished_record() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        wal.begin_record(RecordType::Insert, 1, 9).unwrap();
        // Never ended; the next begin abandons it
        let location = append(&mut wal, RecordType::Update, 2, b"kept");

        let (header, payload) = wal.read_record(location).unwrap();
        assert_eq!(header.rtype, RecordType::Update);
        assert_eq!(payload, b"kept");
        assert_eq!(wal.last_write_location(), location);
    }

    #[test]
    fn end_without_begin_fails() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        assert!(matches!(wal.end_record(), Err(WalError::NoRecordInFlight)));
    }

    #[test]
    fn oversized_payload_rejected() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        let result = wal.begin_record(RecordType::Insert, 1, MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(result, Err(WalError::PayloadTooLarge { .. })));
    }

    #[test]
    fn record_larger_than_segment_rejected() {
        let dir = tempdir().unwrap();
        let mut wal = small_wal(&dir.path().join("wal"), 64);

        let result = wal.begin_record(RecordType::Insert, 1, 64);
        assert!(matches!(result, Err(WalError::InvalidArgument { .. })));
    }

    #[test]
    fn rollover_keeps_records_intact() {
        let dir = tempdir().unwrap();
        let mut wal = small_wal(&dir.path().join("wal"), 256);

        let mut locations = Vec::new();
        for i in 0..20u8 {
            let payload = [i; 40];
            locations.push(append(&mut wal, RecordType::Insert, 1, &payload));
        }

        assert!(
            wal.current_location().segment > 1,
            "twenty 68-byte records cannot fit one 256-byte segment"
        );

        for (i, location) in locations.iter().enumerate() {
            let (header, payload) = wal.read_record(*location).unwrap();
            assert_eq!(header.rtype, RecordType::Insert);
            assert_eq!(payload, vec![i as u8; 40]);
        }
    }

    #[test]
    fn records_never_straddle_segments() {
        let dir = tempdir().unwrap();
        let mut wal = small_wal(&dir.path().join("wal"), 100);

        // 68-byte records: one fits, the second must start a new segment
        let l1 = append(&mut wal, RecordType::Insert, 1, &[1; 40]);
        let l2 = append(&mut wal, RecordType::Insert, 1, &[2; 40]);

        assert_eq!(l1, WalLocation::new(1, 0));
        assert_eq!(l2, WalLocation::new(2, 0));
    }

    #[test]
    fn checkpoint_appends_durable_marker() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        append(&mut wal, RecordType::Insert, 5, b"before checkpoint");
        wal.checkpoint().unwrap();

        let (header, payload) = wal.read_record(wal.last_write_location()).unwrap();
        assert_eq!(header.rtype, RecordType::Checkpoint);
        assert_eq!(header.xid, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn checkpoint_location_is_remembered_per_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal");

        let mut wal = Wal::open(&path).unwrap();
        assert!(wal.last_checkpoint_location().is_unset());

        append(&mut wal, RecordType::Insert, 1, b"payload");
        wal.checkpoint().unwrap();
        assert_eq!(wal.last_checkpoint_location(), wal.last_write_location());
        wal.close().unwrap();
        drop(wal);

        // A fresh handle has no remembered checkpoint
        let wal = Wal::open(&path).unwrap();
        assert!(wal.last_checkpoint_location().is_unset());
    }

    #[test]
    fn reopen_resumes_at_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal");

        let l1 = {
            let mut wal = Wal::open(&path).unwrap();
            let l1 = append(&mut wal, RecordType::Insert, 1, b"survives");
            wal.close().unwrap();
            l1
        };

        let mut wal = Wal::open(&path).unwrap();
        assert_eq!(wal.last_write_location(), l1);

        // New records append after, and chain to, the survivor
        let l2 = append(&mut wal, RecordType::Update, 1, b"appended");
        assert!(l2 > l1);
        let (h2, _) = wal.read_record(l2).unwrap();
        assert_eq!(h2.prev_record, l1);

        let (h1, p1) = wal.read_record(l1).unwrap();
        assert_eq!(h1.rtype, RecordType::Insert);
        assert_eq!(p1, b"survives");
    }

    #[test]
    fn operations_fail_after_close() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();
        wal.close().unwrap();

        assert!(matches!(
            wal.begin_record(RecordType::Insert, 1, 4),
            Err(WalError::Closed)
        ));
        assert!(matches!(wal.flush(true), Err(WalError::Closed)));
        assert!(matches!(wal.close(), Err(WalError::Closed)));
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal");

        let _wal = Wal::open(&path).unwrap();
        assert!(matches!(Wal::open(&path), Err(WalError::Locked)));
    }

    #[test]
    fn read_unset_location_rejected() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        assert!(matches!(
            wal.read_record(WalLocation::UNSET),
            Err(WalError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn read_missing_segment_rejected() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal")).unwrap();

        assert!(matches!(
            wal.read_record(WalLocation::new(99, 0)),
            Err(WalError::SegmentNotFound { segment: 99 })
        ));
    }
}
