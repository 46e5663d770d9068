use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "leadflow", about = "Lead event pipeline for dna-me marketing automation")]
pub struct Cli {
    /// Config directory or single TOML file
    #[arg(long, default_value = "config", env = "LEADFLOW_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the full service: HTTP surface, workers and schedulers
    Run,
    /// Run database migrations and exit
    Migrate,
    /// Run one score-decay sweep and exit
    Decay,
    /// Aggregate and send one daily digest, then exit
    Digest,
}
