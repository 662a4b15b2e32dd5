//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::run::RunArgs;

/// Occupancy, arrival and departure statistics by time of day and day of week.
///
/// Reads entry/exit records, bins them over an analysis window and reports
/// per-bin flows together with their distribution across weeks.
#[derive(Debug, Parser)]
#[command(name = "hm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute flow tables and statistics for a file of visits.
    Run(RunArgs),

    /// Print the effective configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "hm",
            "run",
            "--visits",
            "visits.jsonl",
            "--start",
            "2024-01-01T00:00:00",
            "--bin-size",
            "30",
            "--edge-bins",
            "whole",
            "--exclude",
            "OBS",
            "--exclude",
            "ADM",
            "--percentiles",
            "50,95",
            "--json",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.bin_size, Some(30));
        assert_eq!(args.exclude, vec!["OBS".to_string(), "ADM".to_string()]);
        assert_eq!(args.percentiles, Some(vec![50.0, 95.0]));
        assert!(args.json);
        assert!(!args.no_categories);
    }
}
