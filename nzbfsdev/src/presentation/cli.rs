use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "nzbfsdev CLI", long_about = None)]
pub struct Cli {
    /// JSON streaming config; missing keys take defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// override the metadata tree root
    #[arg(long = "metadata-root", global = true)]
    pub metadata_root: Option<PathBuf>,

    /// override the registry root holding stored NZBs
    #[arg(long = "stream-root", global = true)]
    pub stream_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an NZB and print its virtual path
    Register {
        nzb: PathBuf,
        /// suggested name (defaults to the NZB file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List a virtual directory
    Ls {
        #[arg(default_value = "")]
        dir: String,
        /// show size, status and mtime
        #[arg(long)]
        long: bool,
    },

    /// Describe one virtual file
    Stat { path: String },

    /// Print the segment list of a virtual file
    Segments { path: String },

    /// Delete a virtual file's metadata
    Rm { path: String },

    /// Set a file's health status
    Status {
        path: String,
        /// healthy | partial | corrupted
        status: String,
    },

    /// Evict stale registrations now
    Sweep {
        /// keep sweeping every `sweep_interval_secs` until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Show the segment window for a read of RANGE_LEN bytes
    Window {
        range_len: u64,
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Parse and resolve an HTTP byte range
    Range {
        header: String,
        #[arg(long)]
        total: u64,
    },

    /// Decode a path-with-args string
    Args { encoded: String },
}
