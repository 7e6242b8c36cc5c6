use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vest",
    about = "Vestline continuous value-vesting ledger simulator",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a TOML scenario against an in-memory ledger
    Simulate(SimulateArgs),
    /// Show how a stream would be split at a given instant
    Preview(PreviewArgs),
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file
    pub scenario: PathBuf,
    /// Ledger configuration file, overriding the scenario's `[ledger]` table
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct PreviewArgs {
    #[arg(long)]
    pub deposit: u128,
    #[arg(long)]
    pub start: u64,
    #[arg(long)]
    pub stop: u64,
    /// Instant to evaluate at
    #[arg(long)]
    pub at: u64,
    /// Amount the recipient has already withdrawn
    #[arg(long, default_value = "0")]
    pub withdrawn: u128,
}
