//! PostgreSQL database integration
//!
//! Connection pooling via deadpool-postgres over tokio-postgres.

pub mod adapter;
pub mod client;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
