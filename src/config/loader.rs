//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DatabaseTarget, TabportConfig};
use super::secret::secret_string;
use crate::domain::errors::TabportError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file, or starts from defaults when it does not exist
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into TabportConfig
/// 4. Applies environment variable overrides (TABPORT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File exists but cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use tabport::config::loader::load_config;
///
/// let config = load_config("tabport.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TabportConfig> {
    let mut config = read_config(path)?;
    config.validate().map_err(|e| {
        TabportError::Configuration(format!("Configuration validation failed: {e}"))
    })?;
    Ok(config)
}

/// Loads configuration without validating it
///
/// CLI flags are applied on top of the result before validation.
pub fn read_config(path: impl AsRef<Path>) -> Result<TabportConfig> {
    let path = path.as_ref();

    let mut config = if path.exists() {
        let contents = fs::read_to_string(path).map_err(|e| {
            TabportError::Configuration(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let contents = substitute_env_vars(&contents)?;

        toml::from_str(&contents)
            .map_err(|e| TabportError::Configuration(format!("Failed to parse TOML: {e}")))?
    } else {
        tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
        TabportConfig::default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TabportError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        // Comments are copied as-is
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(TabportError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            TabportError::Configuration(format!("Invalid value '{val}' for {name}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

/// Applies environment variable overrides
///
/// Connection settings use `TABPORT_DB_*`. Everything else follows
/// `TABPORT_<SECTION>_<KEY>`, e.g. `TABPORT_EXPORT_BATCH_SIZE`.
fn apply_env_overrides(config: &mut TabportConfig) -> Result<()> {
    if let Ok(val) = std::env::var("TABPORT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Database connection
    if let Ok(val) = std::env::var("TABPORT_DB_TARGET") {
        config.database.target = match val.to_ascii_lowercase().as_str() {
            "postgresql" => DatabaseTarget::PostgreSQL,
            "mariadb" | "mysql" => DatabaseTarget::MariaDB,
            "memory" => DatabaseTarget::Memory,
            other => {
                return Err(TabportError::Configuration(format!(
                    "Invalid value '{other}' for TABPORT_DB_TARGET"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("TABPORT_DB_HOST") {
        config.database.host = val;
    }
    if let Some(port) = env_parse("TABPORT_DB_PORT")? {
        config.database.port = Some(port);
    }
    if let Ok(val) = std::env::var("TABPORT_DB_USER") {
        config.database.user = val;
    }
    if let Ok(val) = std::env::var("TABPORT_DB_PASSWORD") {
        config.database.password = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("TABPORT_DB_NAME") {
        config.database.database = val;
    }
    if let Some(max) = env_parse("TABPORT_DB_MAX_CONNECTIONS")? {
        config.database.max_connections = max;
    }

    // Export
    if let Ok(val) = std::env::var("TABPORT_EXPORT_OUTPUT_DIR") {
        config.export.output_dir = val;
    }
    if let Some(format) = env_parse("TABPORT_EXPORT_FORMAT")? {
        config.export.format = format;
    }
    if let Some(size) = env_parse("TABPORT_EXPORT_BATCH_SIZE")? {
        config.export.batch_size = size;
    }
    if let Some(workers) = env_parse("TABPORT_EXPORT_PARALLEL_WORKERS")? {
        config.export.parallel_workers = workers;
    }
    if let Some(compress) = env_parse("TABPORT_EXPORT_COMPRESS")? {
        config.export.compress = compress;
    }
    if let Some(tables) = env_list("TABPORT_EXPORT_TABLES") {
        config.export.tables = tables;
    }
    if let Some(tables) = env_list("TABPORT_EXPORT_EXCLUDE_TABLES") {
        config.export.exclude_tables = tables;
    }

    // Import
    if let Ok(val) = std::env::var("TABPORT_IMPORT_INPUT_DIR") {
        config.import.input_dir = val;
    }
    if let Some(mode) = env_parse("TABPORT_IMPORT_MODE")? {
        config.import.mode = mode;
    }
    if let Some(size) = env_parse("TABPORT_IMPORT_BATCH_SIZE")? {
        config.import.batch_size = size;
    }
    if let Some(workers) = env_parse("TABPORT_IMPORT_PARALLEL_WORKERS")? {
        config.import.parallel_workers = workers;
    }
    if let Some(disable_fk) = env_parse("TABPORT_IMPORT_DISABLE_FK")? {
        config.import.disable_fk = disable_fk;
    }
    if let Some(continue_on_error) = env_parse("TABPORT_IMPORT_CONTINUE_ON_ERROR")? {
        config.import.continue_on_error = continue_on_error;
    }

    // Retry
    if let Some(retries) = env_parse("TABPORT_RETRY_MAX_RETRIES")? {
        config.retry.max_retries = retries;
    }
    if let Some(timeout) = env_parse("TABPORT_RETRY_BATCH_TIMEOUT_SECONDS")? {
        config.retry.batch_timeout_seconds = timeout;
    }

    // Logging
    if let Some(enabled) = env_parse("TABPORT_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Ok(val) = std::env::var("TABPORT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
