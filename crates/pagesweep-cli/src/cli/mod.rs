//! CLI for the pagesweep paginated aggregator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagesweep_core::config;

use commands::{run_config, run_fetch, FetchArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pagesweep")]
#[command(about = "pagesweep: load every page of a paginated listing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Aggregate all records for one or more collection keys.
    Fetch {
        /// Collection keys (e.g. province ids), loaded in order.
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,

        /// Concurrent page workers (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Print one JSON object per record instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and effective configuration.
    Config,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                keys,
                concurrency,
                json,
            } => {
                run_fetch(
                    &cfg,
                    FetchArgs {
                        keys,
                        concurrency,
                        json,
                    },
                )
                .await?
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
