//! MariaDB database integration
//!
//! Connection pooling via the mysql_async pool. Foreign-key relaxation uses
//! the session variable `FOREIGN_KEY_CHECKS`.

pub mod adapter;
pub mod client;

pub use adapter::MariaDBAdapter;
pub use client::MariaDBClient;
