//! Export orchestration
//!
//! [`ExportJob`] drives one export: enumerate and filter tables, plan each
//! into batches, run the batches on the worker pool and write one manifest
//! per table.

pub mod coordinator;
pub mod summary;

pub use coordinator::{ExportJob, ExportJobConfig, ExportTask, ExportedBatch};
pub use summary::{ExportSummary, ExportTableState, TableExportResult};
