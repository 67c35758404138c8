use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(
    version,
    about = "Local-first page store with legacy migration and backups"
)]
pub struct Cli {
    /// Root directory for the page store, legacy file and backups
    #[clap(short = 'd', long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the pagevault application
    #[clap(subcommand)]
    pub command: Commands,
}
