//! WAL record header codec and checksum primitive.

use crate::error::{WalError, WalResult};
use crate::types::{RecordType, WalLocation};

/// On-disk record header size in bytes.
///
/// `total_len (4) + type (4) + xid (4) + prev_segment (4) + prev_offset (4)
/// + data_len (2) + reserved (2)`. The two reserved bytes keep the payload
/// word-aligned.
pub const HEADER_SIZE: usize = 24;

/// Size of the trailing CRC in bytes.
pub const CRC_SIZE: usize = 4;

/// Maximum payload size for a single record.
///
/// The on-disk `data_len` field is 16 bits wide.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// The on-disk prefix of every WAL record.
///
/// The full on-wire record is `header || payload[data_len] || crc`, where
/// the CRC covers header and payload. `prev_record` links to the previous
/// record this writer appended, regardless of transaction - a write-order
/// chain, not a per-transaction chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Total record length: header + payload + CRC.
    pub total_len: u32,
    /// Record type.
    pub rtype: RecordType,
    /// Transaction ID; 0 means "no transaction".
    pub xid: u32,
    /// Location of the previously appended record.
    pub prev_record: WalLocation,
    /// Payload length in bytes.
    pub data_len: u16,
}

impl RecordHeader {
    /// Builds a header for a record with the given payload length.
    #[must_use]
    pub fn new(rtype: RecordType, xid: u32, prev_record: WalLocation, data_len: u16) -> Self {
        Self {
            total_len: (HEADER_SIZE + data_len as usize + CRC_SIZE) as u32,
            rtype,
            xid,
            prev_record,
            data_len,
        }
    }

    /// Serializes the header into the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_SIZE`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.total_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.rtype.as_u32().to_le_bytes());
        buf[8..12].copy_from_slice(&self.xid.to_le_bytes());
        buf[12..16].copy_from_slice(&self.prev_record.segment.to_le_bytes());
        buf[16..20].copy_from_slice(&self.prev_record.offset.to_le_bytes());
        buf[20..22].copy_from_slice(&self.data_len.to_le_bytes());
        buf[22..24].copy_from_slice(&[0, 0]);
    }

    /// Deserializes a header from the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if `buf` is too short or the type field does
    /// not name a known record type.
    pub fn decode(buf: &[u8]) -> WalResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(WalError::corruption(format!(
                "record header truncated: {} of {HEADER_SIZE} bytes",
                buf.len()
            )));
        }

        let total_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let raw_type = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let rtype = RecordType::from_u32(raw_type)
            .ok_or_else(|| WalError::corruption(format!("unknown record type {raw_type}")))?;
        let xid = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let prev_segment = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let prev_offset = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let data_len = u16::from_le_bytes([buf[20], buf[21]]);

        Ok(Self {
            total_len,
            rtype,
            xid,
            prev_record: WalLocation::new(prev_segment, prev_offset),
            data_len,
        })
    }

    /// Validates the size invariants of a decoded header.
    ///
    /// `total_len` must equal `HEADER_SIZE + data_len + CRC_SIZE` and fit
    /// within one segment.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if either invariant is violated.
    pub fn validate(&self, segment_size: u32) -> WalResult<()> {
        let expected = (HEADER_SIZE + self.data_len as usize + CRC_SIZE) as u32;
        if self.total_len != expected {
            return Err(WalError::corruption(format!(
                "record length mismatch: total_len {} but data_len {} implies {}",
                self.total_len, self.data_len, expected
            )));
        }
        if self.total_len > segment_size {
            return Err(WalError::corruption(format!(
                "record length {} exceeds segment size {}",
                self.total_len, segment_size
            )));
        }
        Ok(())
    }
}

/// Computes the CRC-32 checksum of `data`.
///
/// Reflected CRC-32 with polynomial `0xEDB88320`, initial value
/// `0xFFFFFFFF`, and final XOR `0xFFFFFFFF`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
