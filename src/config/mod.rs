//! Configuration management for Tabport.
//!
//! This module provides TOML-based configuration loading, parsing, and
//! validation.
//!
//! # Overview
//!
//! Tabport uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `TABPORT_*` environment overrides, including `TABPORT_DB_HOST`,
//!   `TABPORT_DB_PORT`, `TABPORT_DB_USER`, `TABPORT_DB_PASSWORD` and
//!   `TABPORT_DB_NAME`
//! - Default values for every setting (a missing file is not an error)
//! - Validation before any database work starts
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tabport::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tabport.toml")?;
//! println!("Export format: {}", config.export.format);
//! println!("Import mode: {}", config.import.mode);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [database]
//! target = "postgresql"   # or "mariadb"; port defaults per target
//! host = "db.internal"
//! user = "tabport"
//! password = "${TABPORT_DB_PASSWORD}"
//! database = "shop"
//!
//! [export]
//! output_dir = "./export"
//! format = "csv"
//! batch_size = 1000
//! parallel_workers = 16
//! compress = true
//!
//! [import]
//! parallel_workers = "50%"   # or "auto", or a number
//! mode = "skip"
//! continue_on_error = false
//!
//! [retry]
//! max_retries = 3
//! batch_timeout_seconds = 300
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, read_config};
pub use schema::{
    ApplicationConfig, DatabaseConfig, DatabaseTarget, ExportConfig, ImportConfig,
    LoggingConfig, RetryConfig, TabportConfig, WorkerCount,
};
pub use secret::{secret_string, SecretString, SecretValue};
