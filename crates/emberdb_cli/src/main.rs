//! EmberDB WAL CLI
//!
//! Command-line tools for inspecting write-ahead log directories.
//!
//! # Commands
//!
//! - `dump` - Print WAL records for debugging
//! - `verify` - Scan the log and verify every record checksum
//! - `stats` - Per-segment and per-transaction summary
//!
//! All commands are read-only and never take the writer lock, so they can
//! inspect the log of a running database.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EmberDB write-ahead log tools.
#[derive(Parser)]
#[command(name = "emberdb-wal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the WAL directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Segment file size in bytes (inferred from the files when omitted)
    #[arg(global = true, long)]
    segment_size: Option<u32>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print WAL records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this segment number
        #[arg(short, long, default_value = "1")]
        start_segment: u32,
    },

    /// Scan the log and verify every record checksum
    Verify,

    /// Per-segment and per-transaction summary
    Stats,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Dump {
            limit,
            start_segment,
        } => {
            let path = cli.path.ok_or("WAL path required for dump")?;
            commands::dump::run(&path, cli.segment_size, limit, start_segment)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("WAL path required for verify")?;
            commands::verify::run(&path, cli.segment_size)?;
        }
        Commands::Stats => {
            let path = cli.path.ok_or("WAL path required for stats")?;
            commands::stats::run(&path, cli.segment_size)?;
        }
        Commands::Version => {
            println!("EmberDB WAL CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("EmberDB WAL v{}", emberdb_wal::VERSION);
        }
    }

    Ok(())
}
