//! `questline poll`

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::consume::RunSummary;
use crate::cli::commands::open_database;
use crate::cli::output::output;
use crate::domain::models::Config;
use crate::services::{Engine, Shutdown};

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn execute(_args: PollArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = open_database(&config).await?;
    let engine = Engine::build(config, pool).context("Failed to build engine")?;

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();
    let stats = engine.run_poll(shutdown).await.context("Poll service failed")?;

    output(
        &RunSummary {
            service: "poll".to_string(),
            stats,
        },
        json_mode,
    );
    Ok(())
}
