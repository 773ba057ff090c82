//! External system integrations for Tabport.
//!
//! - [`database`] - Database abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation
//! - [`mariadb`] - MariaDB implementation
//! - [`memory`] - In-process implementation for tests and dry runs
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies
//! and enable testing against the in-memory backend. The pipeline only sees
//! `Arc<dyn DatabaseClient>`.
//!
//! ```rust,no_run
//! use tabport::adapters::database::create_database_client;
//! use tabport::config::DatabaseConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::default();
//! let client = create_database_client(&config).await?;
//! let tables = client.list_tables().await?;
//! println!("{} tables in {}", tables.len(), client.database_name());
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod mariadb;
pub mod memory;
pub mod postgresql;
