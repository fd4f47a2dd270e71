//! WAL configuration.

use crate::error::{WalError, WalResult};
use crate::record::{CRC_SIZE, HEADER_SIZE};
use crate::segment::DEFAULT_SEGMENT_SIZE;

/// Configuration for opening a WAL.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Size of each segment file in bytes.
    pub segment_size: u32,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl WalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment file size.
    #[must_use]
    pub const fn segment_size(mut self, size: u32) -> Self {
        self.segment_size = size;
        self
    }

    /// Checks that the configuration can hold at least an empty record.
    pub(crate) fn validate(&self) -> WalResult<()> {
        let min = (HEADER_SIZE + CRC_SIZE) as u32;
        if self.segment_size < min {
            return Err(WalError::invalid_argument(format!(
                "segment size {} is below the minimum of {min}",
                self.segment_size
            )));
        }
        Ok(())
    }
}
