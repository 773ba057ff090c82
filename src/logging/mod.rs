//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Human-readable console output on stderr
//! - Configurable log levels, overridable through `RUST_LOG`
//! - JSON file logging with rotation
//!
//! # Example
//!
//! ```no_run
//! use tabport::logging::init_logging;
//! use tabport::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};
