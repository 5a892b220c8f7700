//! Command-line interface for the quest engine.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::consume::ConsumeArgs;
use commands::cursor::CursorArgs;
use commands::init::InitArgs;
use commands::poll::PollArgs;
use commands::process::ProcessArgs;
use commands::quest::QuestArgs;

#[derive(Parser, Debug)]
#[command(name = "questline")]
#[command(about = "Questline - quest automation over the firehose and Jetstream", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .questline/config.yaml and local.yaml)
    #[arg(short, long, global = true, env = "QUESTLINE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project directory, default config and database
    Init(InitArgs),
    /// Consume an event stream until ctrl-c
    Consume(ConsumeArgs),
    /// Run poll quests until ctrl-c
    Poll(PollArgs),
    /// Run one reply through the quest watching its parent post
    Process(ProcessArgs),
    /// Quest definition management
    Quest(QuestArgs),
    /// Stream cursor inspection
    Cursor(CursorArgs),
}

impl Commands {
    /// Whether `-v` asked for debug logging.
    pub const fn verbose(&self) -> bool {
        match self {
            Self::Consume(args) => args.verbose,
            Self::Poll(args) => args.verbose,
            _ => false,
        }
    }
}

/// Report a failed command and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
