//! Validate config command implementation

use super::exit_code;
use crate::config::{load_config, DatabaseTarget};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug, Default)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");
        println!("Validating configuration file: {config_path}");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Configuration is invalid");
                println!("  Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        println!("Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        match config.database.target {
            DatabaseTarget::PostgreSQL => {
                println!(
                    "  Database: postgresql://{}@{}:{}/{}",
                    config.database.user,
                    config.database.host,
                    config.database.port(),
                    config.database.database
                );
                println!("  Max Connections: {}", config.database.max_connections);
            }
            DatabaseTarget::MariaDB => {
                println!(
                    "  Database: mariadb://{}@{}:{}/{}",
                    config.database.user,
                    config.database.host,
                    config.database.port(),
                    config.database.database
                );
                println!("  Max Connections: {}", config.database.max_connections);
            }
            DatabaseTarget::Memory => println!("  Database: in-memory"),
        }
        println!(
            "  Export: {} format, batch size {}, {} workers, output {}{}",
            config.export.format,
            config.export.batch_size,
            config.export.parallel_workers,
            config.export.output_dir,
            if config.export.compress { ", gzip" } else { "" }
        );
        println!(
            "  Import: mode {}, {} rows per statement, {} workers, input {}",
            config.import.mode,
            config.import.batch_size,
            config.import.parallel_workers,
            config.import.input_dir
        );
        println!(
            "  Retry: {} retries, {}s batch timeout",
            config.retry.max_retries, config.retry.batch_timeout_seconds
        );
        Ok(exit_code::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[export]\nformat = \"csv\"\nbatch_size = 10").unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, exit_code::SUCCESS);
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[import]\nmode = \"merge\"").unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, exit_code::CONFIGURATION);
    }
}
