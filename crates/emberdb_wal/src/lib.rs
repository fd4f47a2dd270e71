//! # EmberDB WAL
//!
//! Durable, ordered, append-only write-ahead logging for EmberDB.
//!
//! All mutations are recorded to the log before the in-memory structures
//! that describe them are considered committed. After a crash, replaying
//! the log from the last checkpoint restores a transactionally consistent
//! state.
//!
//! ## Record Format
//!
//! ```text
//! | total_len (4) | type (4) | xid (4) | prev_segment (4) | prev_offset (4) |
//! | data_len (2) | reserved (2) | payload (N) | crc32 (4) |
//! ```
//!
//! All fields are little-endian. `total_len` counts header, payload, and
//! CRC. The CRC covers header and payload. Records are packed into
//! fixed-size, preallocated segment files and never straddle a segment
//! boundary.
//!
//! ## Recovery Policy
//!
//! The forward scan distinguishes **tolerated** conditions (clean end of
//! log) from **fatal** conditions (corruption):
//!
//! - A zero `total_len`, end of file at a header boundary, or a missing
//!   next segment end the scan cleanly.
//! - A malformed header or a CRC mismatch stops the scan; recovery fails
//!   with [`WalError::RecoveryFailed`], which carries the statistics for
//!   the prefix that was applied.
//!
//! Only records of transactions whose *final* state is committed are
//! handed to the caller's handlers; data records of aborted or incomplete
//! transactions are never applied.
//!
//! ## Concurrency
//!
//! The engine is single-writer and single-threaded: the write path takes
//! `&mut self`, and an advisory lock file keeps other processes out of the
//! WAL directory. Recovery does not run concurrently with writes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod reader;
mod record;
mod recovery;
mod segment;
mod types;
mod writer;

pub use config::WalConfig;
pub use error::{WalError, WalResult};
pub use reader::{LogReader, RecordIter, ScannedRecord};
pub use record::{compute_crc32, RecordHeader, CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use recovery::{HandlerTable, RecoveryStats};
pub use segment::{segment_file_name, SegmentState, DEFAULT_SEGMENT_SIZE, FIRST_SEGMENT};
pub use types::{RecordType, WalLocation};
pub use writer::Wal;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
