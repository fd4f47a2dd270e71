//! Core type definitions for the WAL.

use std::fmt;

/// Address of a record's first byte in the log.
///
/// Locations order lexicographically on `(segment, offset)`, so a later
/// record always compares greater than an earlier one. The sentinel
/// [`WalLocation::UNSET`] (`0/0`) means "unset / beginning of log";
/// segment number 0 is never allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalLocation {
    /// Segment number, starting at 1.
    pub segment: u32,
    /// Byte offset within the segment.
    pub offset: u32,
}

impl WalLocation {
    /// The "unset / beginning of log" sentinel.
    pub const UNSET: Self = Self {
        segment: 0,
        offset: 0,
    };

    /// Creates a location from a segment number and byte offset.
    #[must_use]
    pub const fn new(segment: u32, offset: u32) -> Self {
        Self { segment, offset }
    }

    /// Returns true if this is the unset sentinel.
    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.segment == 0 && self.offset == 0
    }
}

impl fmt::Display for WalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08X}", self.segment, self.offset)
    }
}

/// Type tag of a WAL record.
///
/// The numeric values are part of the on-disk format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RecordType {
    /// Invalid / placeholder record.
    Null = 0,
    /// Checkpoint marker; all prior records are durable.
    Checkpoint = 1,
    /// Transaction commit.
    XactCommit = 2,
    /// Transaction abort.
    XactAbort = 3,
    /// Row insertion.
    Insert = 4,
    /// Row update.
    Update = 5,
    /// Row deletion.
    Delete = 6,
    /// New page allocation.
    NewPage = 7,
    /// Schema change.
    Schema = 8,
}

impl RecordType {
    /// Number of record types, for handler-table sizing.
    pub const COUNT: usize = 9;

    /// Converts an on-disk value to a record type.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::Checkpoint),
            2 => Some(Self::XactCommit),
            3 => Some(Self::XactAbort),
            4 => Some(Self::Insert),
            5 => Some(Self::Update),
            6 => Some(Self::Delete),
            7 => Some(Self::NewPage),
            8 => Some(Self::Schema),
            _ => None,
        }
    }

    /// Converts the record type to its on-disk value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns true for control records the recovery engine handles
    /// internally (`Null`, `Checkpoint`, `XactCommit`, `XactAbort`).
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Self::Null | Self::Checkpoint | Self::XactCommit | Self::XactAbort
        )
    }

    /// Index into per-type tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Checkpoint => "checkpoint",
            Self::XactCommit => "xact-commit",
            Self::XactAbort => "xact-abort",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NewPage => "new-page",
            Self::Schema => "schema",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_ordering_is_lexicographic() {
        let a = WalLocation::new(1, 500);
        let b = WalLocation::new(2, 0);
        let c = WalLocation::new(2, 8);
        assert!(a < b);
        assert!(b < c);
        assert!(WalLocation::UNSET < a);
    }

    #[test]
    fn unset_sentinel() {
        assert!(WalLocation::UNSET.is_unset());
        assert!(!WalLocation::new(1, 0).is_unset());
        assert_eq!(WalLocation::default(), WalLocation::UNSET);
    }

    #[test]
    fn location_display() {
        assert_eq!(format!("{}", WalLocation::new(3, 0x1C)), "3/0000001C");
    }

    #[test]
    fn record_type_roundtrip() {
        for v in 0..RecordType::COUNT as u32 {
            let t = RecordType::from_u32(v).unwrap();
            assert_eq!(t.as_u32(), v);
        }
        assert_eq!(RecordType::from_u32(9), None);
        assert_eq!(RecordType::from_u32(u32::MAX), None);
    }

    #[test]
    fn control_records() {
        assert!(RecordType::Null.is_control());
        assert!(RecordType::Checkpoint.is_control());
        assert!(RecordType::XactCommit.is_control());
        assert!(RecordType::XactAbort.is_control());
        assert!(!RecordType::Insert.is_control());
        assert!(!RecordType::Schema.is_control());
    }
}
