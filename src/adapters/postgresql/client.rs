//! PostgreSQL connection handling

use crate::config::schema::PostgreSQLConfig;
use crate::domain::{QuarryError, Result, StorageError};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::NoTls;

/// Pooled PostgreSQL connection
///
/// The pool holds a single connection: the destination has one mutator.
pub struct PostgreSQLClient {
    pool: Pool,
    config: PostgreSQLConfig,
}

impl PostgreSQLClient {
    /// Build the pool; no connection is opened until first use
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string or TLS setup is invalid.
    pub fn new(config: PostgreSQLConfig) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_ref()
            .parse()
            .map_err(|e| {
                QuarryError::Configuration(format!("Invalid PostgreSQL connection string: {}", e))
            })?;
        pg_config.ssl_mode(ssl_mode(&config.ssl_mode)?);
        pg_config.connect_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = if config.ssl_mode == "disable" {
            Manager::from_config(pg_config, NoTls, manager_config)
        } else {
            let connector = native_tls::TlsConnector::builder().build().map_err(|e| {
                QuarryError::Configuration(format!("Failed to initialise TLS: {}", e))
            })?;
            Manager::from_config(pg_config, MakeTlsConnector::new(connector), manager_config)
        };

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(1)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                QuarryError::Storage(StorageError::ConnectionFailed(format!(
                    "Failed to create connection pool: {}",
                    e
                )))
            })?;

        Ok(Self { pool, config })
    }

    /// Check the server answers
    pub async fn test_connection(&self) -> std::result::Result<(), StorageError> {
        let client = self.connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| {
                StorageError::ConnectionFailed(format!("Connection test failed: {}", e))
            })?;

        tracing::info!(
            server = %self.connection_string_safe(),
            "PostgreSQL connection test successful"
        );
        Ok(())
    }

    /// Take the pooled connection
    pub async fn connection(
        &self,
    ) -> std::result::Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| {
            StorageError::ConnectionFailed(format!("Failed to get connection from pool: {}", e))
        })
    }

    pub fn schema(&self) -> &str {
        &self.config.schema
    }

    pub fn statement_timeout_ms(&self) -> u64 {
        self.config.statement_timeout_seconds * 1000
    }

    /// Connection string with credentials removed, for logs
    pub fn connection_string_safe(&self) -> String {
        redact(self.config.connection_string.expose_secret().as_ref())
    }
}

fn ssl_mode(mode: &str) -> Result<SslMode> {
    match mode {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(QuarryError::Configuration(format!(
            "Unsupported ssl_mode '{}'",
            other
        ))),
    }
}

fn redact(connection_string: &str) -> String {
    connection_string
        .rsplit_once('@')
        .map(|(_, host)| format!("postgresql://***@{}", host))
        .unwrap_or_else(|| "postgresql://***".to_string())
}
