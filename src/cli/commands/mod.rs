//! CLI command implementations

pub mod export;
pub mod import;
pub mod validate;

use crate::adapters::database::{create_database_client, DatabaseClient};
use crate::config::{read_config, TabportConfig};
use crate::domain::{ErrorClass, Result, TabportError};
use std::sync::Arc;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// At least one table ended failed
    pub const TABLE_FAILED: i32 = 1;
    /// Invalid configuration, detected before any batch ran
    pub const CONFIGURATION: i32 = 2;
    /// The database handle could not be created
    pub const CONNECTION: i32 = 4;
    pub const FATAL: i32 = 5;
    /// Stopped by SIGINT or SIGTERM
    pub const INTERRUPTED: i32 = 130;
}

/// Read the configuration, apply command-line overrides and validate
pub fn resolve_config(
    path: &str,
    overrides: impl FnOnce(&mut TabportConfig) -> Result<()>,
) -> Result<TabportConfig> {
    let mut config = read_config(path)?;
    overrides(&mut config)?;
    config.validate().map_err(|e| {
        TabportError::Configuration(format!("Configuration validation failed: {e}"))
    })?;
    Ok(config)
}

/// Open the configured database with at most `workers` pooled connections
pub(crate) async fn connect(
    config: &TabportConfig,
    workers: usize,
) -> std::result::Result<Arc<dyn DatabaseClient>, i32> {
    let mut db_config = config.database.clone();
    db_config.max_connections = db_config.max_connections.min(workers).max(1);

    create_database_client(&db_config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create database client");
        eprintln!("Failed to connect to database: {e}");
        match e.class() {
            ErrorClass::Configuration => exit_code::CONFIGURATION,
            _ => exit_code::CONNECTION,
        }
    })
}

/// Exit code for an error returned by a job before any batch ran
pub(crate) fn job_error_code(error: &TabportError) -> i32 {
    match error.class() {
        ErrorClass::Configuration => exit_code::CONFIGURATION,
        ErrorClass::Connectivity => exit_code::CONNECTION,
        _ => exit_code::FATAL,
    }
}

/// Exit code once a job produced its summary
pub(crate) fn summary_code(interrupted: bool, successful: bool) -> i32 {
    if interrupted {
        exit_code::INTERRUPTED
    } else if successful {
        exit_code::SUCCESS
    } else {
        exit_code::TABLE_FAILED
    }
}

/// Split comma-separated list arguments, dropping empty entries
pub(crate) fn table_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_table_list_splits_and_trims() {
        let values = vec!["users, orders".to_string(), "items,".to_string()];
        assert_eq!(table_list(&values), vec!["users", "orders", "items"]);
    }

    #[test_case(true, true, exit_code::INTERRUPTED)]
    #[test_case(true, false, exit_code::INTERRUPTED)]
    #[test_case(false, true, exit_code::SUCCESS)]
    #[test_case(false, false, exit_code::TABLE_FAILED)]
    fn test_summary_code(interrupted: bool, successful: bool, expected: i32) {
        assert_eq!(summary_code(interrupted, successful), expected);
    }

    #[test]
    fn test_job_error_code() {
        assert_eq!(
            job_error_code(&TabportError::Configuration("x".into())),
            exit_code::CONFIGURATION
        );
        assert_eq!(
            job_error_code(&TabportError::Connectivity("x".into())),
            exit_code::CONNECTION
        );
        assert_eq!(job_error_code(&TabportError::Io("x".into())), exit_code::FATAL);
    }

    #[test]
    fn test_resolve_config_applies_overrides_before_validation() {
        let err = resolve_config("does-not-exist.toml", |config| {
            config.export.batch_size = 0;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));

        let config = resolve_config("does-not-exist.toml", |config| {
            config.export.batch_size = 5;
            Ok(())
        })
        .unwrap();
        assert_eq!(config.export.batch_size, 5);
    }
}
