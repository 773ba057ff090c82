//! Domain models and types for Tabport.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Table metadata** ([`TableDescriptor`], [`Column`], [`TableFilter`])
//! - **Row data** ([`Value`], [`RowSet`])
//! - **Batches** ([`Batch`], [`RowRange`])
//! - **Error types** ([`TabportError`], [`ErrorClass`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, TabportError>`]:
//!
//! ```rust
//! use tabport::domain::{ErrorClass, TabportError};
//!
//! let err = TabportError::Connectivity("connection reset".to_string());
//! assert_eq!(err.class(), ErrorClass::Connectivity);
//! assert!(err.is_retryable());
//! ```

pub mod batch;
pub mod errors;
pub mod result;
pub mod table;

pub use batch::{Batch, BatchStatus, RowRange};
pub use errors::{ErrorClass, TabportError};
pub use result::Result;
pub use table::{compare_keys, Column, RowSet, TableDescriptor, TableFilter, Value};
