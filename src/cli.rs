//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ingest footprint statistics and curate them into an analytical table.
///
/// Settings come from the environment (and a `.env` file if present);
/// flags given here take precedence.
#[derive(Parser, Debug)]
#[command(name = "footprint")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch raw data from the API into the bucket
    Ingest(RunArgs),
    /// Load raw data from the bucket into the analytical table
    Curate(RunArgs),
    /// Ingest, then curate
    Run(RunArgs),
}

impl Command {
    /// Flags shared by every subcommand.
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Self::Ingest(args) | Self::Curate(args) | Self::Run(args) => args,
        }
    }
}

/// Overrides for environment settings.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// First year to process (overrides START_YEAR)
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last year to process (overrides END_YEAR)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Refresh the countries snapshot from the API (sets UPDATE_COUNTRIES)
    #[arg(long)]
    pub update_countries: bool,

    /// Ignore the checkpoint and start from the first year (clears CHECKPOINT)
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Root directory of the raw bucket (overrides RAW_PATH)
    #[arg(long)]
    pub raw_path: Option<PathBuf>,

    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long)]
    pub database_path: Option<PathBuf>,
}
