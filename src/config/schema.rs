//! Configuration schema types
//!
//! This module defines the configuration structure for Tabport. Every
//! section has defaults, so an empty file (or no file at all) is a valid
//! starting point that environment variables and CLI flags refine.

use crate::config::SecretString;
use crate::core::codec::Format;
use crate::core::import::ImportMode;
use crate::domain::TabportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database target selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseTarget {
    /// PostgreSQL database
    #[default]
    PostgreSQL,
    /// MariaDB (or MySQL) database
    MariaDB,
    /// In-process table store, for tests and dry runs
    Memory,
}

impl DatabaseTarget {
    /// Port used when the configuration names none
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseTarget::PostgreSQL | DatabaseTarget::Memory => 5432,
            DatabaseTarget::MariaDB => 3306,
        }
    }
}

/// Main Tabport configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TabportConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Import settings
    #[serde(default)]
    pub import: ImportConfig,

    /// Retry, timeout and error-recording settings shared by both jobs
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TabportConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.database.validate()?;
        self.export.validate()?;
        self.import.validate()?;
        self.retry.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Which adapter to use
    #[serde(default)]
    pub target: DatabaseTarget,

    #[serde(default = "default_db_host")]
    pub host: String,

    /// Defaults to the target's standard port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_db_user")]
    pub user: String,

    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Database name
    #[serde(default = "default_db_name")]
    pub database: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,

    /// Statement timeout in seconds (0 disables it)
    #[serde(default = "default_statement_timeout_seconds")]
    pub statement_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            target: DatabaseTarget::default(),
            host: default_db_host(),
            port: None,
            user: default_db_user(),
            password: None,
            database: default_db_name(),
            max_connections: default_max_connections(),
            connection_timeout_seconds: default_connection_timeout_seconds(),
            statement_timeout_seconds: default_statement_timeout_seconds(),
        }
    }
}

impl DatabaseConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.target.default_port())
    }

    fn validate(&self) -> Result<(), String> {
        if self.target == DatabaseTarget::Memory {
            return Ok(());
        }

        if self.host.is_empty() {
            return Err("database.host cannot be empty".to_string());
        }
        if self.port == Some(0) {
            return Err("database.port must be > 0".to_string());
        }
        if self.user.is_empty() {
            return Err("database.user cannot be empty".to_string());
        }
        if self.database.is_empty() {
            return Err("database.database cannot be empty".to_string());
        }
        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(format!(
                "database.max_connections must be between 1 and 100, got {}",
                self.max_connections
            ));
        }
        if self.connection_timeout_seconds == 0 {
            return Err("database.connection_timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory that receives one sub-directory per table
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_export_format")]
    pub format: Format,

    /// Rows per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: WorkerCount,

    /// Gzip batch files
    #[serde(default)]
    pub compress: bool,

    /// Only these tables (all tables when empty)
    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// WHERE predicate applied to every exported table
    #[serde(default)]
    pub where_clause: Option<String>,

    /// Custom query exported as a single batch under the one name in `tables`
    #[serde(default)]
    pub query: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: default_export_format(),
            batch_size: default_batch_size(),
            parallel_workers: default_parallel_workers(),
            compress: false,
            tables: Vec::new(),
            exclude_tables: Vec::new(),
            where_clause: None,
            query: None,
        }
    }
}

impl ExportConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("export.batch_size must be > 0".to_string());
        }
        validate_workers("export", &self.parallel_workers)?;

        if self.output_dir.is_empty() {
            return Err("export.output_dir cannot be empty".to_string());
        }

        if self.query.is_some() {
            if self.tables.len() != 1 {
                return Err(
                    "export.query requires exactly one table name in export.tables".to_string(),
                );
            }
            if self.where_clause.is_some() {
                return Err("export.query and export.where_clause cannot be combined".to_string());
            }
        }
        Ok(())
    }
}

/// Import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory written by a previous export
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Rows per INSERT statement inside a batch transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: WorkerCount,

    #[serde(default)]
    pub mode: ImportMode,

    /// Suspend foreign-key checks inside each batch transaction
    #[serde(default)]
    pub disable_fk: bool,

    /// Keep going after a batch or table failure
    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            batch_size: default_batch_size(),
            parallel_workers: default_parallel_workers(),
            mode: ImportMode::default(),
            disable_fk: false,
            continue_on_error: false,
            tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

impl ImportConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("import.batch_size must be > 0".to_string());
        }
        validate_workers("import", &self.parallel_workers)?;
        if self.input_dir.is_empty() {
            return Err("import.input_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Time budget for one batch attempt
    #[serde(default = "default_batch_timeout_seconds")]
    pub batch_timeout_seconds: u64,

    /// Errors kept per table in the final report
    #[serde(default = "default_max_recorded_errors")]
    pub max_recorded_errors: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            batch_timeout_seconds: default_batch_timeout_seconds(),
            max_recorded_errors: default_max_recorded_errors(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("retry.initial_delay_ms cannot exceed retry.max_delay_ms".to_string());
        }
        if self.batch_timeout_seconds == 0 {
            return Err("retry.batch_timeout_seconds must be > 0".to_string());
        }
        if self.max_recorded_errors == 0 {
            return Err("retry.max_recorded_errors must be > 0".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is on".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

/// Number of batch workers
///
/// A fixed count, `"auto"` for `min(4, CPUs)`, or a share of the CPUs such
/// as `"50%"` (at least one worker).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkerCount", into = "RawWorkerCount")]
pub enum WorkerCount {
    Fixed(usize),
    Auto,
    Percent(f64),
}

/// TOML accepts either an integer or a string
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawWorkerCount {
    Number(i64),
    Text(String),
}

impl WorkerCount {
    /// Worker count on this machine
    pub fn resolve(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        self.resolve_for(cpus)
    }

    fn resolve_for(&self, cpus: usize) -> usize {
        match *self {
            WorkerCount::Fixed(n) => n,
            WorkerCount::Auto => cpus.min(4),
            WorkerCount::Percent(p) => ((cpus as f64 * p / 100.0) as usize).max(1),
        }
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCount::Fixed(n) => write!(f, "{n}"),
            WorkerCount::Auto => f.write_str("auto"),
            WorkerCount::Percent(p) => write!(f, "{p}%"),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = TabportError;

    fn from_str(s: &str) -> crate::domain::Result<Self> {
        let s = s.trim();
        let invalid = || {
            TabportError::Configuration(format!(
                "invalid worker count '{s}', expected a number, \"auto\" or a percentage like \"50%\""
            ))
        };
        if s.eq_ignore_ascii_case("auto") {
            return Ok(WorkerCount::Auto);
        }
        if let Some(percent) = s.strip_suffix('%') {
            return percent
                .trim()
                .parse::<f64>()
                .map(WorkerCount::Percent)
                .map_err(|_| invalid());
        }
        s.parse::<usize>().map(WorkerCount::Fixed).map_err(|_| invalid())
    }
}

impl TryFrom<RawWorkerCount> for WorkerCount {
    type Error = TabportError;

    fn try_from(raw: RawWorkerCount) -> crate::domain::Result<Self> {
        match raw {
            RawWorkerCount::Number(n) => usize::try_from(n).map(WorkerCount::Fixed).map_err(|_| {
                TabportError::Configuration(format!("worker count cannot be negative, got {n}"))
            }),
            RawWorkerCount::Text(text) => text.parse(),
        }
    }
}

impl From<WorkerCount> for RawWorkerCount {
    fn from(count: WorkerCount) -> Self {
        match count {
            WorkerCount::Fixed(n) => RawWorkerCount::Number(n as i64),
            other => RawWorkerCount::Text(other.to_string()),
        }
    }
}

fn validate_workers(section: &str, workers: &WorkerCount) -> Result<(), String> {
    match *workers {
        WorkerCount::Fixed(n) if n == 0 || n > 256 => Err(format!(
            "{section}.parallel_workers must be between 1 and 256, got {n}"
        )),
        WorkerCount::Percent(p) if !p.is_finite() || p <= 0.0 || p > 100.0 => Err(format!(
            "{section}.parallel_workers percentage must be in (0, 100], got {p}%"
        )),
        _ => Ok(()),
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_connection_timeout_seconds() -> u64 {
    30
}

fn default_statement_timeout_seconds() -> u64 {
    0
}

fn default_output_dir() -> String {
    "./export".to_string()
}

fn default_input_dir() -> String {
    "./export".to_string()
}

fn default_export_format() -> Format {
    Format::Sql
}

fn default_batch_size() -> usize {
    1000
}

fn default_parallel_workers() -> WorkerCount {
    WorkerCount::Fixed(16)
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_batch_timeout_seconds() -> u64 {
    300
}

fn default_max_recorded_errors() -> usize {
    20
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
