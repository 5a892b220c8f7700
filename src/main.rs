//! Questline CLI entry point.

use clap::Parser;

use questline::cli::{commands, handle_error, Cli, Commands};
use questline::infrastructure::config::ConfigLoader;
use questline::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli.command, cli.config.as_deref(), cli.json).await {
        handle_error(err, cli.json);
    }
}

async fn run(command: Commands, config_path: Option<&std::path::Path>, json: bool) -> anyhow::Result<()> {
    if let Commands::Init(args) = command {
        let _logger = LoggerImpl::init(&LogConfig::default())?;
        return commands::init::execute(args, json).await;
    }

    let config = ConfigLoader::resolve(config_path)?;
    let _logger = LoggerImpl::init(&LogConfig::from_settings(&config.logging, command.verbose()))?;

    match command {
        Commands::Init(_) => Ok(()),
        Commands::Consume(args) => commands::consume::execute(args, config, json).await,
        Commands::Poll(args) => commands::poll::execute(args, config, json).await,
        Commands::Process(args) => commands::process::execute(args, config, json).await,
        Commands::Quest(args) => commands::quest::execute(args, config, json).await,
        Commands::Cursor(args) => commands::cursor::execute(args, config, json).await,
    }
}
