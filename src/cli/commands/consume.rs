//! `questline consume firehose|jetstream`

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::cli::commands::open_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::{Engine, Shutdown, StatsSnapshot, StreamKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StreamArg {
    Firehose,
    Jetstream,
}

impl From<StreamArg> for StreamKind {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Firehose => Self::Firehose,
            StreamArg::Jetstream => Self::Jetstream,
        }
    }
}

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Which event stream to read
    #[arg(value_enum)]
    pub stream: StreamArg,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Final counters printed when a long-running service stops.
#[derive(Debug, serde::Serialize)]
pub struct RunSummary {
    pub service: String,
    pub stats: StatsSnapshot,
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let s = &self.stats;
        format!(
            "{} stopped: {} consumed, {} relevant, {} matched, {} fired, {} errors, {} reconnects",
            self.service, s.events_consumed, s.relevant, s.matches, s.triggers_fired, s.errors, s.reconnects
        )
    }
}

pub async fn execute(args: ConsumeArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = open_database(&config).await?;
    let engine = Engine::build(config, pool).context("Failed to build engine")?;

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let kind = StreamKind::from(args.stream);
    let stats = engine
        .run_consumer(kind, shutdown)
        .await
        .context("Consumer failed")?;

    let service = match kind {
        StreamKind::Firehose => "firehose",
        StreamKind::Jetstream => "jetstream",
    };
    output(
        &RunSummary {
            service: service.to_string(),
            stats,
        },
        json_mode,
    );
    Ok(())
}
