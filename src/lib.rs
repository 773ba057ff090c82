// Tabport - Parallel table export and import with checksum verification
// Copyright (c) 2025 Tabport Contributors
// Licensed under the MIT License

//! # Tabport - parallel table export and import
//!
//! Tabport moves relational tables between a database and portable batch
//! files. Every exported table gets a manifest whose checksum lets a later
//! import prove that it is applying exactly what was exported.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Planning** tables into key-range or offset batches
//! - **Exporting** batches in parallel as CSV, JSON or SQL files, optionally gzipped
//! - **Verifying** batch files against an order-independent checksum chain
//! - **Importing** with skip, replace, truncate or cancel conflict handling
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Planning, worker pool, codecs, manifests, export and import jobs
//! - [`adapters`] - Database integrations (PostgreSQL, in-memory)
//! - [`domain`] - Table, batch and error types
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabport::adapters::database::create_database_client;
//! use tabport::config::load_config;
//! use tabport::core::export::{ExportJob, ExportJobConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("tabport.toml")?;
//!     let db = create_database_client(&config.database).await?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let job = ExportJob::new(db, ExportJobConfig::from_config(&config), shutdown_rx);
//!     let summary = job.run().await?;
//!
//!     println!("{}", summary.format_report());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library functions return [`domain::Result`], whose error type
//! [`domain::TabportError`] classifies every failure into one
//! [`domain::ErrorClass`]. The job policy retries only connectivity errors
//! and never retries a checksum mismatch.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
