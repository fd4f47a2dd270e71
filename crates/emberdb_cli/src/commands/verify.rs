//! Verify WAL record checksums.

use crate::commands::resolve_segment_size;
use emberdb_wal::LogReader;
use std::path::Path;

/// Scans the whole log, verifying every record's CRC.
///
/// Returns an error describing the first corrupt record, if any.
pub fn run(path: &Path, segment_size: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let segment_size = resolve_segment_size(path, segment_size)?;
    let reader = LogReader::open(path, segment_size)?;

    let mut records = 0u64;
    let mut bytes = 0u64;
    let mut last_segment = 0u32;
    let mut segments = 0u32;

    for item in reader.iter() {
        let rec = item?;
        if rec.location.segment != last_segment {
            last_segment = rec.location.segment;
            segments += 1;
        }
        records += 1;
        bytes += u64::from(rec.header.total_len);
    }

    println!("ok: {records} record(s), {bytes} bytes across {segments} segment(s)");
    Ok(())
}
