//! Summarize a WAL directory.

use crate::commands::resolve_segment_size;
use emberdb_wal::{LogReader, RecordType};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

#[derive(Default)]
struct SegmentSummary {
    records: u64,
    bytes: u64,
}

/// Prints per-segment record counts and a transaction summary.
pub fn run(path: &Path, segment_size: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let segment_size = resolve_segment_size(path, segment_size)?;
    let reader = LogReader::open(path, segment_size)?;

    let mut per_segment: HashMap<u32, SegmentSummary> = HashMap::new();
    let mut commits = 0u64;
    let mut aborts = 0u64;
    let mut checkpoints = 0u64;
    let mut data_records = 0u64;
    let mut xids: HashSet<u32> = HashSet::new();

    for item in reader.iter() {
        let rec = match item {
            Ok(rec) => rec,
            Err(e) => {
                warn!(error = %e, "scan stopped early");
                break;
            }
        };

        let summary = per_segment.entry(rec.location.segment).or_default();
        summary.records += 1;
        summary.bytes += u64::from(rec.header.total_len);

        if rec.header.xid > 0 {
            xids.insert(rec.header.xid);
        }
        match rec.header.rtype {
            RecordType::XactCommit => commits += 1,
            RecordType::XactAbort => aborts += 1,
            RecordType::Checkpoint => checkpoints += 1,
            RecordType::Null => {}
            _ => data_records += 1,
        }
    }

    println!("segment size: {segment_size} bytes");
    println!("segments on disk: {}", reader.segments().len());

    let mut numbers: Vec<u32> = per_segment.keys().copied().collect();
    numbers.sort_unstable();
    for num in numbers {
        let summary = &per_segment[&num];
        println!(
            "  segment {num}: {} record(s), {} bytes used",
            summary.records, summary.bytes
        );
    }

    println!("data records: {data_records}");
    println!("commits: {commits}, aborts: {aborts}, checkpoints: {checkpoints}");
    println!("distinct transactions: {}", xids.len());
    Ok(())
}
