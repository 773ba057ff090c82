//! Database client factory
//!
//! This module provides the factory function that creates a database client
//! based on configuration.

use crate::adapters::database::traits::DatabaseClient;
use crate::adapters::mariadb::{MariaDBAdapter, MariaDBClient};
use crate::adapters::memory::MemoryDatabase;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{DatabaseConfig, DatabaseTarget};
use crate::domain::Result;
use std::sync::Arc;

/// Create a database client based on the configuration
///
/// The connection is tested before the client is returned, so a bad host
/// or credentials surface here rather than in the first batch.
///
/// # Errors
///
/// Returns a configuration error if the pool cannot be built and a
/// connectivity error if the database cannot be reached.
pub async fn create_database_client(config: &DatabaseConfig) -> Result<Arc<dyn DatabaseClient>> {
    let client: Arc<dyn DatabaseClient> = match config.target {
        DatabaseTarget::PostgreSQL => {
            tracing::info!(
                host = %config.host,
                port = config.port(),
                database = %config.database,
                max_connections = config.max_connections,
                "Creating PostgreSQL client"
            );
            let client = PostgreSQLClient::new(config)?;
            Arc::new(PostgreSQLAdapter::new(client))
        }
        DatabaseTarget::MariaDB => {
            tracing::info!(
                host = %config.host,
                port = config.port(),
                database = %config.database,
                max_connections = config.max_connections,
                "Creating MariaDB client"
            );
            let client = MariaDBClient::new(config)?;
            Arc::new(MariaDBAdapter::new(client))
        }
        DatabaseTarget::Memory => {
            tracing::info!(database = %config.database, "Creating in-memory database");
            Arc::new(MemoryDatabase::new(config.database.clone()))
        }
    };

    client.test_connection().await?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_target() {
        let config = DatabaseConfig {
            target: DatabaseTarget::Memory,
            database: "scratch".to_string(),
            ..Default::default()
        };

        let client = create_database_client(&config).await.unwrap();
        assert_eq!(client.database_name(), "scratch");
        assert!(client.list_tables().await.unwrap().is_empty());
    }
}
