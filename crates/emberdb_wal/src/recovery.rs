//! Crash recovery: scan the log, resolve transaction fates, and replay
//! committed work through caller-supplied handlers.
//!
//! Recovery runs **two full scans** over the log. The first builds a map
//! from transaction ID to final state; the second dispatches records. The
//! two-pass discipline exists because a record's fate is unknowable until
//! its transaction's last control record has been seen: a commit marker is
//! only authoritative for the records logged before it, so a data record
//! *reopens* its transaction. No data-bearing record of an aborted or
//! incomplete transaction is ever applied.
//!
//! Both passes start at the most recent checkpoint this handle wrote -
//! the success path appends one, so a repeated recovery replays nothing.
//! A freshly opened handle starts from the beginning of the log.
//!
//! Control records (`Null`, `Checkpoint`, `XactCommit`, `XactAbort`) are
//! handled internally; handler-table entries for them are ignored.

use crate::error::{WalError, WalResult};
use crate::reader::{LogReader, ScannedRecord};
use crate::record::RecordHeader;
use crate::segment::FIRST_SEGMENT;
use crate::types::{RecordType, WalLocation};
use crate::writer::Wal;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the scan reports progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Final state of a transaction at end-of-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    InProgress,
    Committed,
    Aborted,
}

/// Per-transaction bookkeeping built during the first pass.
#[derive(Debug)]
struct TxnEntry {
    state: TxnState,
    first: WalLocation,
    last: WalLocation,
}

impl TxnEntry {
    fn new(location: WalLocation) -> Self {
        Self {
            state: TxnState::InProgress,
            first: location,
            last: location,
        }
    }
}

/// Folds one record into the transaction map.
///
/// A commit or abort marker settles the transaction's state; a later
/// data-bearing record for the same XID reopens it. Records with
/// `xid == 0` are non-transactional and not tracked.
fn track_transaction(txns: &mut HashMap<u32, TxnEntry>, rec: &ScannedRecord) {
    let header = &rec.header;
    if header.xid == 0 {
        return;
    }

    let entry = txns
        .entry(header.xid)
        .or_insert_with(|| TxnEntry::new(rec.location));
    entry.last = rec.location;

    match header.rtype {
        RecordType::XactCommit => entry.state = TxnState::Committed,
        RecordType::XactAbort => entry.state = TxnState::Aborted,
        t if t.is_control() => {}
        _ => entry.state = TxnState::InProgress,
    }
}

/// A caller-supplied handler for one record type.
///
/// Receives the opaque database instance, the record header, and the
/// payload. Returns `true` on success; `false` aborts recovery.
pub type RecordHandler<D> = Box<dyn FnMut(&mut D, &RecordHeader, &[u8]) -> bool>;

/// Table of recovery handlers, indexed by [`RecordType`].
///
/// Missing entries mean "skip this record type". Entries registered for
/// control types are ignored - the recovery engine handles those itself.
pub struct HandlerTable<D> {
    entries: [Option<RecordHandler<D>>; RecordType::COUNT],
}

impl<D> HandlerTable<D> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }

    /// Registers a handler for `rtype`, replacing any previous one.
    pub fn register<F>(&mut self, rtype: RecordType, handler: F) -> &mut Self
    where
        F: FnMut(&mut D, &RecordHeader, &[u8]) -> bool + 'static,
    {
        self.entries[rtype.index()] = Some(Box::new(handler));
        self
    }

    fn get_mut(&mut self, rtype: RecordType) -> Option<&mut RecordHandler<D>> {
        self.entries[rtype.index()].as_mut()
    }
}

impl<D> Default for HandlerTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for HandlerTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| i))
            .collect();
        f.debug_struct("HandlerTable")
            .field("registered", &registered)
            .finish()
    }
}

/// Counters reported by a recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Segments the scan read at least one record from.
    pub segments_processed: u32,
    /// Records scanned, control records included.
    pub records_processed: u64,
    /// Data records dispatched to a handler that succeeded.
    pub records_applied: u64,
    /// Data records not applied: uncommitted transaction or no handler.
    pub records_skipped: u64,
    /// Transactions whose final state was committed.
    pub committed_transactions: u64,
    /// Transactions whose final state was aborted.
    pub aborted_transactions: u64,
    /// Transactions with neither a final commit nor abort.
    pub incomplete_transactions: u64,
    /// Total record bytes scanned.
    pub bytes_processed: u64,
    /// Wall-clock duration of the recovery run.
    pub recovery_time_ms: u64,
}

impl fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records ({} applied, {} skipped), {} committed / {} aborted / {} incomplete, \
             {} segments, {} bytes, {} ms",
            self.records_processed,
            self.records_applied,
            self.records_skipped,
            self.committed_transactions,
            self.aborted_transactions,
            self.incomplete_transactions,
            self.segments_processed,
            self.bytes_processed,
            self.recovery_time_ms
        )
    }
}

impl Wal {
    /// Replays the log and applies committed work through `handlers`.
    ///
    /// Scans from the most recent checkpoint written through this handle
    /// up to `end` (exclusive; [`WalLocation::UNSET`] means no bound),
    /// then writes a fresh checkpoint. That checkpoint anchors the next
    /// `recover` call on this handle, so running recovery again without
    /// new writes applies nothing. A freshly opened handle has no
    /// remembered checkpoint and scans from the beginning of the log: a
    /// checkpoint merely found on disk does not prove the records before
    /// it were ever replayed, so the conservative anchor `(1, 0)` is used.
    ///
    /// `db` is the caller's opaque database instance, threaded unchanged
    /// into every handler call.
    ///
    /// # Errors
    ///
    /// A malformed record, a CRC mismatch, or a failing handler stops the
    /// scan; the applied prefix stays applied and the returned
    /// [`WalError::RecoveryFailed`] carries the partial statistics. The
    /// engine does not attempt undo.
    pub fn recover<D>(
        &mut self,
        end: WalLocation,
        handlers: &mut HandlerTable<D>,
        db: &mut D,
    ) -> WalResult<RecoveryStats> {
        self.ensure_open()?;

        let started = Instant::now();
        let reader = LogReader::open(self.path(), self.segment_size())?;

        // Anchor at the latest checkpoint this handle wrote, else the
        // start of the log
        let checkpoint = self.last_checkpoint_location();
        let anchor = if checkpoint.is_unset() {
            WalLocation::new(FIRST_SEGMENT, 0)
        } else {
            checkpoint
        };
        debug!(%anchor, "recovery scan anchored");

        // Pass 1: resolve every transaction's final state. Corruption is
        // not reported here; the second pass stops at the same record.
        let mut txns: HashMap<u32, TxnEntry> = HashMap::new();
        let mut seen = 0u64;
        for item in reader.iter_from(anchor, end) {
            let Ok(rec) = item else { break };
            seen += 1;
            track_transaction(&mut txns, &rec);
        }

        if seen == 0 {
            info!(path = %self.path().display(), "write-ahead log is empty; nothing to replay");
        }

        let mut stats = RecoveryStats::default();
        for entry in txns.values() {
            match entry.state {
                TxnState::Committed => stats.committed_transactions += 1,
                TxnState::Aborted => stats.aborted_transactions += 1,
                TxnState::InProgress => stats.incomplete_transactions += 1,
            }
        }
        for (xid, entry) in &txns {
            if entry.state == TxnState::InProgress {
                debug!(
                    xid,
                    first = %entry.first,
                    last = %entry.last,
                    "transaction has no commit or abort record; its records will be skipped"
                );
            }
        }

        // Pass 2: dispatch in write order.
        let mut last_segment = 0u32;
        let mut last_report = Instant::now();
        let mut iter = reader.iter_from(anchor, end);

        let failure = loop {
            let Some(item) = iter.next() else {
                break None;
            };

            let rec = match item {
                Ok(rec) => rec,
                Err(e) => break Some((iter.position(), e)),
            };

            if rec.location.segment != last_segment {
                last_segment = rec.location.segment;
                stats.segments_processed += 1;
            }
            stats.records_processed += 1;
            stats.bytes_processed += u64::from(rec.header.total_len);

            if rec.header.rtype.is_control() {
                if rec.header.rtype == RecordType::Checkpoint {
                    debug!(location = %rec.location, "checkpoint record");
                }
            } else {
                let committed = rec.header.xid == 0
                    || txns
                        .get(&rec.header.xid)
                        .is_some_and(|t| t.state == TxnState::Committed);

                if !committed {
                    stats.records_skipped += 1;
                } else {
                    match handlers.get_mut(rec.header.rtype) {
                        Some(handler) => {
                            if handler(db, &rec.header, &rec.payload) {
                                stats.records_applied += 1;
                            } else {
                                let err = WalError::HandlerFailed {
                                    rtype: rec.header.rtype,
                                    location: rec.location,
                                };
                                break Some((rec.location, err));
                            }
                        }
                        None => stats.records_skipped += 1,
                    }
                }
            }

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                info!(
                    records = stats.records_processed,
                    applied = stats.records_applied,
                    segments = stats.segments_processed,
                    "recovery in progress"
                );
                last_report = Instant::now();
            }
        };

        stats.recovery_time_ms = started.elapsed().as_millis() as u64;

        match failure {
            Some((location, source)) => {
                warn!(%location, error = %source, %stats, "recovery stopped; applied prefix is kept");
                Err(WalError::RecoveryFailed {
                    location,
                    stats: Box::new(stats),
                    source: Box::new(source),
                })
            }
            None => {
                info!(%stats, "recovery complete");
                // Anchor future recoveries past the replayed prefix
                self.checkpoint()?;
                Ok(stats)
            }
        }
    }
}
