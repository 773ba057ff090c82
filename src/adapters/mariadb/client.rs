//! MariaDB client implementation
//!
//! Owns the mysql_async pool and the mapping from driver errors to
//! [`TabportError`].

use crate::config::DatabaseConfig;
use crate::domain::{Result, TabportError};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, DriverError, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use secrecy::ExposeSecret;
use std::time::Duration;

/// MariaDB client for Tabport
pub struct MariaDBClient {
    pool: Pool,
    connect_timeout: Duration,

    host: String,
    port: u16,
    user: String,
    database: String,
}

impl MariaDBClient {
    /// Create a new MariaDB client
    ///
    /// No connection is opened until the first checkout.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pool limits are invalid.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let max = config.max_connections.max(1);
        let constraints = PoolConstraints::new(0, max).ok_or_else(|| {
            TabportError::Configuration(format!("Invalid pool size {max} for MariaDB"))
        })?;

        let password = config
            .password
            .as_ref()
            .map(|p| AsRef::<str>::as_ref(p.expose_secret()).to_string());

        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port())
            .user(Some(config.user.clone()))
            .pass(password)
            .db_name(Some(config.database.clone()))
            .init(session_init(config.statement_timeout_seconds))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        Ok(Self {
            pool: Pool::new(opts),
            connect_timeout: Duration::from_secs(config.connection_timeout_seconds),
            host: config.host.clone(),
            port: config.port(),
            user: config.user.clone(),
            database: config.database.clone(),
        })
    }

    /// Test the connection to MariaDB
    pub async fn test_connection(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| map_mysql_error("Connection test failed", e))?;

        tracing::info!(
            endpoint = %self.connection_string_safe(),
            "MariaDB connection test successful"
        );
        Ok(())
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<Conn> {
        match tokio::time::timeout(self.connect_timeout, self.pool.get_conn()).await {
            Ok(conn) => conn.map_err(|e| map_mysql_error("Failed to connect", e)),
            Err(_) => Err(TabportError::Connectivity(format!(
                "No MariaDB connection within {:?}",
                self.connect_timeout
            ))),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Connection string without the password
    pub fn connection_string_safe(&self) -> String {
        format!(
            "mariadb://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Statements run on every new connection
///
/// UTC and utf8mb4 keep text renderings identical across servers.
pub(crate) fn session_init(statement_timeout_seconds: u64) -> Vec<String> {
    let mut init = vec![
        "SET time_zone = '+00:00'".to_string(),
        "SET NAMES utf8mb4".to_string(),
    ];
    if statement_timeout_seconds > 0 {
        init.push(format!(
            "SET SESSION max_statement_time = {statement_timeout_seconds}"
        ));
    }
    init
}

/// Classify a driver error
pub(crate) fn map_mysql_error(context: &str, err: mysql_async::Error) -> TabportError {
    match err {
        mysql_async::Error::Server(server) => {
            map_server_error(context, server.code, &server.message)
        }
        mysql_async::Error::Io(e) => TabportError::Connectivity(format!("{context}: {e}")),
        mysql_async::Error::Driver(
            e @ (DriverError::ConnectionClosed | DriverError::PoolDisconnected),
        ) => TabportError::Connectivity(format!("{context}: {e}")),
        other => TabportError::Database(format!("{context}: {other}")),
    }
}

/// Classify a server error by its MariaDB error code
pub(crate) fn map_server_error(context: &str, code: u16, message: &str) -> TabportError {
    let message = format!("{context}: {message} (error {code})");
    match code {
        // ER_DUP_ENTRY
        1062 => TabportError::Conflict(message),
        // max_statement_time (MariaDB) and max_execution_time (MySQL)
        1969 | 3024 => TabportError::Timeout(message),
        // lock wait timeout, deadlock, too many connections, shutdown
        1205 | 1213 | 1040 | 1053 => TabportError::Connectivity(message),
        _ => TabportError::Database(message),
    }
}
