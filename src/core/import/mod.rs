//! Import pipeline
//!
//! Reads the artifacts written by an export, verifies them against their
//! manifests and applies them to the target database under one of the
//! conflict modes in [`ImportMode`].

pub mod executor;
pub mod resolver;
pub mod summary;

pub use executor::{AppliedBatch, ImportJob, ImportJobConfig, ImportTask};
pub use resolver::{ConflictResolver, ImportMode};
pub use summary::{ImportState, ImportSummary, TableImportResult};
