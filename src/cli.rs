use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "adaptrade")]
#[command(version = "0.1.0")]
#[command(about = "Online-learning trading agent with drift-aware retraining", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, default_value = "config", env = "ADAPT_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a paper trading session against a simulated market
    Run {
        /// Stop after this many cycles (runs until Ctrl-C otherwise)
        #[arg(long)]
        cycles: Option<u64>,

        /// Resume from the configured session snapshot
        #[arg(long)]
        resume: bool,

        /// Trade Bollinger band crossings ahead of the learned policy
        #[arg(long)]
        rules: bool,

        /// Seed for the simulated market and exploration
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Print a learning report for a saved snapshot
    Inspect {
        /// Snapshot file to read
        path: PathBuf,
    },
}
