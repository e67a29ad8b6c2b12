use adaptrade::cli::{Cli, Commands};
use adaptrade::config::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, inspect, run_paper};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    if let Err(errors) = config.validate() {
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }

    match cli.command {
        Commands::Run {
            cycles,
            resume,
            rules,
            seed,
        } => {
            init_logging(&config.logging);
            let stats = run_paper(config, cycles, resume, rules, seed).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Inspect { path } => {
            init_logging_simple();
            inspect(&config, &path)?;
        }
    }

    Ok(())
}
