//! `questline cursor show`

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::adapters::sqlite::SqliteCursorRepository;
use crate::cli::commands::open_database;
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{Config, CursorRecord};
use crate::domain::ports::CursorRepository;

#[derive(Args, Debug)]
pub struct CursorArgs {
    #[command(subcommand)]
    pub command: CursorCommands,
}

#[derive(Subcommand, Debug)]
pub enum CursorCommands {
    /// Show persisted stream positions
    Show {
        /// Only this service (firehose, jetstream)
        service: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct CursorOutput {
    pub cursors: Vec<CursorRecord>,
}

impl CommandOutput for CursorOutput {
    fn to_human(&self) -> String {
        if self.cursors.is_empty() {
            return "No cursors recorded.".to_string();
        }
        let mut t = table(&["SERVICE", "POSITION", "EVENTS", "UPDATED", "LAST ERROR"]);
        for c in &self.cursors {
            let error = match (&c.last_error, c.last_error_at) {
                (Some(message), Some(at)) => format!("{} ({})", truncate(message, 40), at.to_rfc3339()),
                (Some(message), None) => truncate(message, 40),
                _ => "-".to_string(),
            };
            t.add_row(vec![
                c.service_name.clone(),
                c.position.to_string(),
                c.events_processed.to_string(),
                c.updated_at.to_rfc3339(),
                error,
            ]);
        }
        t.to_string()
    }
}

pub async fn execute(args: CursorArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = open_database(&config).await?;
    let repo = SqliteCursorRepository::new(pool);

    match args.command {
        CursorCommands::Show { service } => {
            let cursors = match service {
                Some(name) => repo.load(&name).await?.into_iter().collect(),
                None => repo.list().await?,
            };
            output(&CursorOutput { cursors }, json_mode);
        }
    }
    Ok(())
}
