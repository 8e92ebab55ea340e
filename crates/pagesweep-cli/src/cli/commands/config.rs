//! `pagesweep config` – show where the config lives and what it contains.

use anyhow::Result;
use pagesweep_core::config::{self, SweepConfig};

pub fn run_config(cfg: &SweepConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", cfg.to_toml()?);
    Ok(())
}
