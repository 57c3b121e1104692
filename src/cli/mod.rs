//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;

/// cacheqos - last-level cache and memory bandwidth partitioning daemon.
#[derive(Parser, Debug)]
#[command(name = "cacheqos")]
#[command(about = "Partitions the last-level cache among workload tiers")]
pub struct Cli {
    /// Configuration file path.
    #[arg(short = 'c', long, default_value = crate::core::config::CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Control-surface listen address override.
    #[arg(long)]
    pub address: Option<String>,

    /// Control-surface listen port override.
    #[arg(long)]
    pub port: Option<u16>,

    /// Verbose logging (debug level).
    #[arg(short = 'V', long)]
    pub verbose: bool,
}
