//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Tabport using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tabport - parallel table export and import with checksum verification
#[derive(Parser, Debug)]
#[command(name = "tabport")]
#[command(version, about, long_about = None)]
#[command(author = "Tabport Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tabport.toml", env = "TABPORT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TABPORT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export tables to batch files with a manifest per table
    Export(commands::export::ExportArgs),

    /// Import a previous export into the configured database
    Import(commands::import::ImportArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}

impl Commands {
    /// Whether the command asked for debug output
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Export(args) => args.verbose,
            Commands::Import(args) => args.verbose,
            Commands::ValidateConfig(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_export() {
        let cli = Cli::parse_from(["tabport", "export"]);
        assert_eq!(cli.config, "tabport.toml");
        assert!(matches!(cli.command, Commands::Export(_)));
        assert!(!cli.command.verbose());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["tabport", "--config", "custom.toml", "import"]);
        assert_eq!(cli.config, "custom.toml");
        assert!(matches!(cli.command, Commands::Import(_)));
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["tabport", "--log-level", "debug", "export"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["tabport", "import", "--verbose"]);
        assert!(cli.command.verbose());
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["tabport", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_worker_count_forms() {
        use crate::config::WorkerCount;

        let cli = Cli::parse_from(["tabport", "export", "--parallel-workers", "auto"]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.parallel_workers, Some(WorkerCount::Auto));

        let cli = Cli::parse_from(["tabport", "import", "--parallel-workers", "25%"]);
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.parallel_workers, Some(WorkerCount::Percent(25.0)));

        assert!(Cli::try_parse_from(["tabport", "export", "--parallel-workers", "lots"]).is_err());
    }
}
