pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use nzbfs_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = handlers::load_config(cli.config, cli.metadata_root, cli.stream_root)?;
    match cli.command {
        Commands::Register { nzb, name } => handlers::handle_register(&cfg, nzb, name),
        Commands::Ls { dir, long } => handlers::handle_ls(&cfg, &dir, long),
        Commands::Stat { path } => handlers::handle_stat(&cfg, &path),
        Commands::Segments { path } => handlers::handle_segments(&cfg, &path),
        Commands::Rm { path } => handlers::handle_rm(&cfg, &path),
        Commands::Status { path, status } => handlers::handle_status(&cfg, &path, &status),
        Commands::Sweep { watch } => handlers::handle_sweep(&cfg, watch),
        Commands::Window { range_len, workers } => {
            handlers::handle_window(&cfg, range_len, workers)
        }
        Commands::Range { header, total } => handlers::handle_range(&header, total),
        Commands::Args { encoded } => handlers::handle_args(&encoded),
    }
}
