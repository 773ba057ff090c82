//! PostgreSQL client implementation
//!
//! Owns the deadpool connection pool and the mapping from driver errors to
//! [`TabportError`].

use crate::config::DatabaseConfig;
use crate::domain::{Result, TabportError};
use deadpool_postgres::{
    Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime,
};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;

/// PostgreSQL client for Tabport
///
/// Each worker checks out one connection per batch call and returns it when
/// the call ends.
pub struct PostgreSQLClient {
    /// Connection pool
    pool: Pool,

    host: String,
    port: u16,
    user: String,
    database: String,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pool cannot be built.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port())
            .user(&config.user)
            .dbname(&config.database)
            .application_name("tabport")
            .connect_timeout(Duration::from_secs(config.connection_timeout_seconds));

        if let Some(password) = &config.password {
            let password: &str = password.expose_secret().as_ref();
            pg_config.password(password);
        }

        pg_config.options(&session_options(config.statement_timeout_seconds));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections.max(1))
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                TabportError::Configuration(format!("Failed to create connection pool: {e}"))
            })?;

        Ok(Self {
            pool,
            host: config.host.clone(),
            port: config.port(),
            user: config.user.clone(),
            database: config.database.clone(),
        })
    }

    /// Test the connection to PostgreSQL
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| map_pg_error("Connection test failed", e))?;

        tracing::info!(
            endpoint = %self.connection_string_safe(),
            "PostgreSQL connection test successful"
        );
        Ok(())
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<Object> {
        self.pool.get().await.map_err(map_pool_error)
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Connection string without the password
    pub fn connection_string_safe(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

/// Startup options that pin the text rendering of values read as text
///
/// Timestamps, intervals and bytea then export identically whatever the
/// server or role defaults are.
pub(crate) fn session_options(statement_timeout_seconds: u64) -> String {
    let mut options = vec![
        "-c TimeZone=UTC".to_string(),
        "-c DateStyle=ISO,YMD".to_string(),
        "-c IntervalStyle=iso_8601".to_string(),
        "-c bytea_output=hex".to_string(),
    ];
    if statement_timeout_seconds > 0 {
        options.push(format!(
            "-c statement_timeout={}",
            statement_timeout_seconds * 1000
        ));
    }
    options.join(" ")
}

/// Classify a driver error
///
/// Unique violations become conflicts, cancelled statements become
/// timeouts, and a broken connection is a retryable connectivity error.
pub(crate) fn map_pg_error(context: &str, err: tokio_postgres::Error) -> TabportError {
    if let Some(db) = err.as_db_error() {
        let code = db.code();
        if *code == SqlState::UNIQUE_VIOLATION {
            return TabportError::Conflict(format!("{context}: {}", db.message()));
        }
        if *code == SqlState::QUERY_CANCELED {
            return TabportError::Timeout(format!("{context}: {}", db.message()));
        }
        if *code == SqlState::ADMIN_SHUTDOWN
            || *code == SqlState::CANNOT_CONNECT_NOW
            || *code == SqlState::TOO_MANY_CONNECTIONS
        {
            return TabportError::Connectivity(format!("{context}: {}", db.message()));
        }
        return TabportError::Database(format!("{context}: {}", db.message()));
    }

    let is_io = std::error::Error::source(&err)
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
    if err.is_closed() || is_io {
        TabportError::Connectivity(format!("{context}: {err}"))
    } else {
        TabportError::Database(format!("{context}: {err}"))
    }
}

pub(crate) fn map_pool_error(err: PoolError) -> TabportError {
    match err {
        PoolError::Backend(e) => map_pg_error("Failed to connect", e),
        other => TabportError::Connectivity(format!("Failed to get connection from pool: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[tokio::test]
    async fn test_connection_string_safe() {
        let config = DatabaseConfig {
            host: "db.internal".to_string(),
            port: Some(5433),
            user: "loader".to_string(),
            password: Some(secret_string("hunter2".to_string())),
            database: "warehouse".to_string(),
            ..Default::default()
        };

        let client = PostgreSQLClient::new(&config).unwrap();
        let safe = client.connection_string_safe();
        assert_eq!(safe, "postgresql://loader@db.internal:5433/warehouse");
        assert!(!safe.contains("hunter2"));
        assert_eq!(client.database_name(), "warehouse");
    }

    #[test]
    fn test_session_options_pin_text_rendering() {
        assert_eq!(
            session_options(30),
            "-c TimeZone=UTC -c DateStyle=ISO,YMD -c IntervalStyle=iso_8601 \
             -c bytea_output=hex -c statement_timeout=30000"
        );
        assert!(!session_options(0).contains("statement_timeout"));
        assert!(session_options(0).starts_with("-c TimeZone=UTC"));
    }

    #[tokio::test]
    async fn test_pool_size_follows_config() {
        let config = DatabaseConfig {
            max_connections: 4,
            ..Default::default()
        };
        let client = PostgreSQLClient::new(&config).unwrap();
        assert_eq!(client.pool_status().max_size, 4);
    }
}
