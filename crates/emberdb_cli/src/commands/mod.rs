//! CLI command implementations.

pub mod dump;
pub mod stats;
pub mod verify;

use emberdb_wal::{LogReader, DEFAULT_SEGMENT_SIZE};
use std::path::Path;

/// Resolves the segment size for a WAL directory.
///
/// Segment files are preallocated to exactly the configured size, so the
/// on-disk length of any segment file *is* the segment size. Falls back
/// to the default for an empty directory.
pub fn resolve_segment_size(path: &Path, explicit: Option<u32>) -> std::io::Result<u32> {
    if let Some(size) = explicit {
        return Ok(size);
    }

    // Probe with the default; only the file list is needed here
    if let Ok(reader) = LogReader::open(path, DEFAULT_SEGMENT_SIZE) {
        if let Some(&first) = reader.segments().first() {
            let len = std::fs::metadata(reader.segment_path(first))?.len();
            if let Ok(size) = u32::try_from(len) {
                return Ok(size);
            }
        }
    }

    Ok(DEFAULT_SEGMENT_SIZE)
}

/// Renders a payload preview: printable text as-is, the rest escaped.
pub fn preview(payload: &[u8], max: usize) -> String {
    let text: String = payload
        .iter()
        .take(max)
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                char::from(b)
            } else {
                '.'
            }
        })
        .collect();

    if payload.len() > max {
        format!("{text}... ({} bytes)", payload.len())
    } else {
        text
    }
}
