use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hm_cli::commands::{config, run};
use hm_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr; stdout carries command output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let loaded = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?loaded, "loaded configuration");

    match &cli.command {
        Some(Commands::Run(args)) => run::run(args, loaded)?,
        Some(Commands::Config) => config::run(&loaded)?,
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
