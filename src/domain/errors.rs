//! Domain error types
//!
//! This module defines the error hierarchy for Tabport. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Tabport error type
///
/// This is the primary error type used throughout the library. Every
/// variant maps onto one [`ErrorClass`], which is what the job policy
/// looks at when a batch or a table fails.
#[derive(Debug, Clone, Error)]
pub enum TabportError {
    /// Invalid mode, format or option, missing manifest
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Lost or refused database connection, pool exhaustion
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// A batch attempt exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Codec failure while encoding or decoding a batch
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checksum mismatch
    #[error("Integrity error for table '{table}': expected {expected}, got {actual}")]
    Integrity {
        table: String,
        expected: String,
        actual: String,
    },

    /// Primary-key collision with an existing row
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other database-side failure (syntax, constraint, permission)
    #[error("Database error: {0}")]
    Database(String),

    /// File system errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Work that was never started because the job or table was stopped
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Error taxonomy used for policy decisions and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Connectivity,
    Serialization,
    Integrity,
    Conflict,
    Configuration,
    Storage,
    Cancelled,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::Connectivity => "ConnectivityError",
            ErrorClass::Serialization => "SerializationError",
            ErrorClass::Integrity => "IntegrityError",
            ErrorClass::Conflict => "ConflictError",
            ErrorClass::Configuration => "ConfigurationError",
            ErrorClass::Storage => "StorageError",
            ErrorClass::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl TabportError {
    /// Create an integrity error for a table
    pub fn integrity(
        table: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        TabportError::Integrity {
            table: table.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            TabportError::Configuration(_) => ErrorClass::Configuration,
            TabportError::Connectivity(_) | TabportError::Timeout(_) => ErrorClass::Connectivity,
            TabportError::Serialization(_) => ErrorClass::Serialization,
            TabportError::Integrity { .. } => ErrorClass::Integrity,
            TabportError::Conflict(_) => ErrorClass::Conflict,
            TabportError::Database(_) | TabportError::Io(_) => ErrorClass::Storage,
            TabportError::Cancelled(_) => ErrorClass::Cancelled,
        }
    }

    /// Whether a failed batch attempt may be retried
    ///
    /// Only transient connectivity failures and timeouts qualify. Checksum
    /// mismatches are never retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Connectivity
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for TabportError {
    fn from(err: std::io::Error) -> Self {
        TabportError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for TabportError {
    fn from(err: serde_json::Error) -> Self {
        TabportError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for TabportError {
    fn from(err: csv::Error) -> Self {
        TabportError::Serialization(format!("CSV error: {err}"))
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for TabportError {
    fn from(err: toml::de::Error) -> Self {
        TabportError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<tokio::time::error::Elapsed> for TabportError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        TabportError::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabportError::Configuration("Invalid mode".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid mode");

        let err = TabportError::integrity("users", "abc", "def");
        assert_eq!(
            err.to_string(),
            "Integrity error for table 'users': expected abc, got def"
        );
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            TabportError::Timeout("30s".into()).class(),
            ErrorClass::Connectivity
        );
        assert_eq!(
            TabportError::Database("syntax".into()).class(),
            ErrorClass::Storage
        );
        assert_eq!(
            TabportError::integrity("t", "a", "b").class(),
            ErrorClass::Integrity
        );
        assert_eq!(ErrorClass::Conflict.to_string(), "ConflictError");
    }

    #[test]
    fn test_only_connectivity_is_retryable() {
        assert!(TabportError::Connectivity("reset".into()).is_retryable());
        assert!(TabportError::Timeout("stalled".into()).is_retryable());
        assert!(!TabportError::integrity("t", "a", "b").is_retryable());
        assert!(!TabportError::Serialization("bad".into()).is_retryable());
        assert!(!TabportError::Conflict("dup".into()).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TabportError = io_err.into();
        assert!(matches!(err, TabportError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TabportError = json_err.into();
        assert!(matches!(err, TabportError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TabportError = toml_err.into();
        assert!(matches!(err, TabportError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
