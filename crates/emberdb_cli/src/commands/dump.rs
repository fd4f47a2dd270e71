//! Dump WAL records for debugging.

use crate::commands::{preview, resolve_segment_size};
use emberdb_wal::{LogReader, WalLocation};
use std::path::Path;
use tracing::warn;

/// Prints records from `start_segment` onward, up to `limit`.
pub fn run(
    path: &Path,
    segment_size: Option<u32>,
    limit: Option<usize>,
    start_segment: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let segment_size = resolve_segment_size(path, segment_size)?;
    let reader = LogReader::open(path, segment_size)?;

    let start = WalLocation::new(start_segment, 0);
    let limit = limit.unwrap_or(usize::MAX);
    let mut printed = 0usize;

    println!(
        "{:<16} {:<12} {:>10} {:>8} {:<16} PAYLOAD",
        "LOCATION", "TYPE", "XID", "LEN", "PREV"
    );

    for item in reader.iter_from(start, WalLocation::UNSET) {
        if printed >= limit {
            break;
        }
        let rec = match item {
            Ok(rec) => rec,
            Err(e) => {
                warn!(error = %e, "scan stopped");
                break;
            }
        };

        println!(
            "{:<16} {:<12} {:>10} {:>8} {:<16} {}",
            rec.location.to_string(),
            rec.header.rtype.to_string(),
            rec.header.xid,
            rec.header.data_len,
            rec.header.prev_record.to_string(),
            preview(&rec.payload, 48),
        );
        printed += 1;
    }

    println!("\n{printed} record(s)");
    Ok(())
}
