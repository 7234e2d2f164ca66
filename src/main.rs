use anyhow::Result;
use clap::Parser;

use stepcache::cli::{Cli, Commands};
use stepcache::logging::{self, LogFormat};
use stepcache::{commands, config_discovery};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let config = config_discovery::load_config_with_discovery(cli.config.as_deref())?;

    // Initialize structured logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    logging::init(
        Some(level),
        LogFormat::resolve(config.log.format.as_deref()),
    );

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Run(args) => commands::run::run(&args, &config),
        Commands::Cache(args) => commands::cache::cache(&args, &config),
    }
}
