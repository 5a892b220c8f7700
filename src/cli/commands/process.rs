//! `questline process`: synchronous single-reply processing.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::open_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::{Engine, ProcessOutcome, ProcessRequest};

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// AT-URI of the reply
    #[arg(long)]
    pub reply_uri: String,

    #[arg(long)]
    pub author_did: String,

    #[arg(long)]
    pub author_handle: String,

    /// Reply text
    #[arg(long, default_value = "")]
    pub text: String,

    /// RFC 3339 timestamp; now when omitted
    #[arg(long)]
    pub created_at: Option<String>,

    /// AT-URI of the quest post that was replied to
    #[arg(long)]
    pub quest_uri: String,
}

impl CommandOutput for ProcessOutcome {
    fn to_human(&self) -> String {
        let quest = self.quest_title.as_deref().unwrap_or("-");
        if self.skipped {
            return format!(
                "Skipped ({quest}): {}",
                self.skip_reason.as_deref().unwrap_or("conditions not met")
            );
        }
        let mut lines = vec![format!(
            "Quest {quest}: {}",
            if self.success { "succeeded" } else { "failed" }
        )];
        if !self.executed.is_empty() {
            lines.push(format!("Executed: {}", self.executed.join(", ")));
        }
        for error in &self.errors {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ProcessArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = open_database(&config).await?;
    let engine = Engine::build(config, pool).context("Failed to build engine")?;

    let outcome = engine
        .dispatcher()
        .process_event(ProcessRequest {
            reply_uri: args.reply_uri,
            author_did: args.author_did,
            author_handle: args.author_handle,
            text: args.text,
            created_at: args.created_at,
            quest_uri: args.quest_uri,
        })
        .await
        .context("Failed to process event")?;

    output(&outcome, json_mode);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
