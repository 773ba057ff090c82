//! Database abstraction layer
//!
//! This module provides a trait-based abstraction for database operations,
//! allowing Tabport to work with different backends (PostgreSQL, in-memory).

pub mod factory;
pub mod traits;

pub use factory::create_database_client;
pub use traits::{ApplyOptions, ApplyOutcome, DatabaseClient, OnConflict};
