// Connection pool over the sqlx `Any` driver (MySQL or SQLite)

use crate::config::DatabaseConfig;
use crate::db::context::{QueryContext, Stage};
use crate::errors::DatabaseError;
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Transaction};
use std::fmt;
use tracing::{info, instrument};

/// Store flavour behind a connection URL.
///
/// Both use `?` placeholders, so statements are shared; only DDL differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Sqlite,
}

impl Backend {
    /// Detect the backend from the URL scheme
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(DatabaseError::UnsupportedBackend(format!(
                "scheme '{scheme}' (expected mysql, mariadb or sqlite)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database connection pool wrapper
///
/// Constructed explicitly by the caller and lent to repositories; nothing in
/// this crate keeps a process-wide pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: AnyPool,
    backend: Backend,
}

impl DbPool {
    /// Create a new database connection pool
    ///
    /// # Errors
    /// Returns `DatabaseError::UnsupportedBackend` for an unknown URL scheme and
    /// `DatabaseError::ConnectionFailed` if unable to establish a connection
    #[instrument(skip(config), fields(
        max_open_connections = config.max_open_connections,
        max_idle_connections = config.max_idle_connections
    ))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let backend = Backend::from_url(&config.url)?;
        info!(backend = %backend, "Initializing database connection pool");

        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_open_connections)
            // A floor of warm connections the pool opens eagerly and keeps past
            // the idle timeout. sqlx has no cap on idle connections, so this is
            // not an upper bound.
            .min_connections(config.max_idle_connections.min(config.max_open_connections))
            .idle_timeout(config.max_idle_time())
            .max_lifetime(config.max_lifetime())
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create database pool");
                DatabaseError::ConnectionFailed(e.to_string())
            })?;

        info!(
            backend = %backend,
            max_open_connections = config.max_open_connections,
            max_idle_connections = config.max_idle_connections,
            "Database connection pool initialized successfully"
        );

        Ok(Self { pool, backend })
    }

    /// Get a reference to the underlying pool
    ///
    /// This is used by repositories to execute queries
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Check out one connection, bounded by the context deadline
    pub async fn acquire(&self, ctx: &QueryContext) -> Result<PoolConnection<Any>, DatabaseError> {
        ctx.run(Stage::Acquire, async {
            self.pool.acquire().await.map_err(|e| match DatabaseError::from(e) {
                // Anything that goes wrong before a statement runs is a connection problem
                DatabaseError::QueryFailed(msg) => DatabaseError::ConnectionFailed(msg),
                other => other,
            })
        })
        .await
    }

    /// Begin a transaction, bounded by the context deadline
    pub async fn begin(&self, ctx: &QueryContext) -> Result<Transaction<'static, Any>, DatabaseError> {
        ctx.run(Stage::Acquire, async {
            self.pool.begin().await.map_err(|e| match DatabaseError::from(e) {
                DatabaseError::QueryFailed(msg) => DatabaseError::ConnectionFailed(msg),
                other => other,
            })
        })
        .await
    }

    /// Perform a health check on the database connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                DatabaseError::HealthCheckFailed(e.to_string())
            })?;

        tracing::debug!("Database health check passed");
        Ok(())
    }

    /// Get the current number of connections in the pool
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Get the number of idle connections in the pool
    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Close the connection pool gracefully
    #[instrument(skip(self))]
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("pool.db").display()),
            max_open_connections: 4,
            max_idle_connections: 1,
            max_idle_time_seconds: 60,
            max_lifetime_seconds: 0,
            connect_timeout_seconds: 5,
        }
    }

    #[test]
    fn test_backend_detection() {
        assert_eq!(Backend::from_url("mysql://u:p@localhost/db").unwrap(), Backend::MySql);
        assert_eq!(Backend::from_url("mariadb://localhost/db").unwrap(), Backend::MySql);
        assert_eq!(Backend::from_url("sqlite::memory:").unwrap(), Backend::Sqlite);
        assert_eq!(Backend::from_url("SQLITE://x.db").unwrap(), Backend::Sqlite);
        assert!(matches!(
            Backend::from_url("postgres://localhost/db"),
            Err(DatabaseError::UnsupportedBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_pool_creation_and_health_check() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = DbPool::new(&sqlite_config(&dir)).await.unwrap();

        assert_eq!(pool.backend(), Backend::Sqlite);
        assert!(pool.health_check().await.is_ok());
        assert!(pool.size() >= 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_acquire_after_close_is_connection_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = DbPool::new(&sqlite_config(&dir)).await.unwrap();
        pool.close().await;

        let result = pool.acquire(&QueryContext::background()).await;
        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_unsupported_backend_is_rejected_before_connecting() {
        let mut config = crate::config::Settings::default().database;
        config.url = "postgresql://localhost/comments".to_string();

        let result = DbPool::new(&config).await;
        assert!(matches!(result, Err(DatabaseError::UnsupportedBackend(_))));
    }
}
