//! Error types for the WAL engine.

use crate::recovery::RecoveryStats;
use crate::types::{RecordType, WalLocation};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur in WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] emberdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The WAL directory cannot be created or is not a directory.
    #[error("WAL directory unavailable: {path}")]
    DirectoryUnavailable {
        /// The offending path.
        path: PathBuf,
    },

    /// Another process holds the WAL lock.
    #[error("WAL locked: another process has exclusive access")]
    Locked,

    /// Operation attempted after the WAL was closed.
    #[error("WAL is closed")]
    Closed,

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// Record payload exceeds the per-record maximum.
    #[error("record payload too large: {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
        /// Maximum allowed payload length.
        max: usize,
    },

    /// `end_record` called without a matching `begin_record`.
    #[error("no record in flight")]
    NoRecordInFlight,

    /// A record or segment failed validation.
    #[error("WAL corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// A record's stored CRC does not match its contents.
    #[error("checksum mismatch at {location}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Location of the record.
        location: WalLocation,
        /// CRC stored in the record.
        expected: u32,
        /// CRC computed over the record bytes.
        actual: u32,
    },

    /// A segment file does not exist.
    #[error("segment {segment} not found")]
    SegmentNotFound {
        /// The missing segment number.
        segment: u32,
    },

    /// A caller-registered recovery handler reported failure.
    #[error("recovery handler failed for {rtype} record at {location}")]
    HandlerFailed {
        /// Type of the record being applied.
        rtype: RecordType,
        /// Location of the record being applied.
        location: WalLocation,
    },

    /// The recovery scan could not make forward progress.
    ///
    /// The prefix applied before the failure stays applied; `stats`
    /// describes it so the caller can decide to give up or continue in
    /// degraded mode.
    #[error("recovery failed at {location}: {source}")]
    RecoveryFailed {
        /// Location at which the scan stopped.
        location: WalLocation,
        /// Statistics for the applied prefix.
        stats: Box<RecoveryStats>,
        /// The underlying failure.
        #[source]
        source: Box<WalError>,
    },
}

impl WalError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
