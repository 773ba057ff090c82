//! Core export and import pipeline.
//!
//! # Modules
//!
//! - [`plan`] - Splits a table into key-range or offset batches
//! - [`pool`] - Bounded worker pool and the job failure policy
//! - [`codec`] - CSV, JSON and SQL batch encodings
//! - [`verification`] - Batch digests and the table checksum chain
//! - [`manifest`] - Per-table manifest and on-disk artifact layout
//! - [`export`] - Export job coordinator and summary
//! - [`import`] - Import conflict modes, executor and summary
//! - [`report`] - Bounded per-table error recording
//!
//! # Export Workflow
//!
//! 1. **Enumerate**: List tables and apply the include/exclude filter
//! 2. **Plan**: Split each table into batches in canonical order
//! 3. **Execute**: Workers fetch, encode and write batch files
//! 4. **Checksum**: Fold batch digests into the table checksum by sequence
//! 5. **Manifest**: Write the manifest once every batch is on disk
//!
//! # Import Workflow
//!
//! Each table moves through `Verifying → Preparing → Applying` and ends
//! `Verified`, `Unverified` or `Failed`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabport::adapters::memory::MemoryDatabase;
//! use tabport::config::TabportConfig;
//! use tabport::core::export::{ExportJob, ExportJobConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TabportConfig::default();
//! let db = Arc::new(MemoryDatabase::new("demo"));
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let job = ExportJob::new(db, ExportJobConfig::from_config(&config), shutdown_rx);
//! let summary = job.run().await?;
//!
//! println!("Rows: {}", summary.total_rows());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod export;
pub mod import;
pub mod manifest;
pub mod plan;
pub mod pool;
pub mod report;
pub mod verification;
