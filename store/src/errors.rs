// Error handling framework
// Every repository failure surfaces as one of these kinds, never as a panic.

use thiserror::Error;

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The store could not be reached (pool exhausted, I/O, TLS, deadline
    /// passed while waiting for a connection).
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    /// The statement was malformed, rejected, or could not be scanned.
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// The insert ran but the store did not hand back a usable generated id.
    #[error("Generated identifier unavailable: {0}")]
    IdentityRetrievalFailed(String),

    #[error("Unsupported database backend: {0}")]
    UnsupportedBackend(String),
}

impl DatabaseError {
    /// Prefix the message with the operation that failed, keeping the kind.
    pub fn in_operation(self, operation: &str) -> Self {
        match self {
            Self::ConnectionFailed(msg) => Self::ConnectionFailed(format!("{operation}: {msg}")),
            Self::HealthCheckFailed(msg) => Self::HealthCheckFailed(format!("{operation}: {msg}")),
            Self::QueryFailed(msg) => Self::QueryFailed(format!("{operation}: {msg}")),
            Self::TransactionFailed(msg) => Self::TransactionFailed(format!("{operation}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{operation}: {msg}")),
            Self::IdentityRetrievalFailed(msg) => {
                Self::IdentityRetrievalFailed(format!("{operation}: {msg}"))
            }
            Self::UnsupportedBackend(msg) => Self::UnsupportedBackend(format!("{operation}: {msg}")),
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connection",
            Self::HealthCheckFailed(_) => "health_check",
            Self::QueryFailed(_) => "query",
            Self::TransactionFailed(_) => "transaction",
            Self::NotFound(_) => "not_found",
            Self::IdentityRetrievalFailed(_) => "identity",
            Self::UnsupportedBackend(_) => "unsupported_backend",
        }
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                DatabaseError::ConnectionFailed("timed out acquiring a pooled connection".to_string())
            }
            sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed("connection pool is closed".to_string())
            }
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Tls(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Configuration(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => {
                DatabaseError::QueryFailed(db_err.message().to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[test]
    fn test_pool_errors_map_to_connection_failed() {
        let timed_out: DatabaseError = sqlx::Error::PoolTimedOut.into();
        let closed: DatabaseError = sqlx::Error::PoolClosed.into();
        assert!(matches!(timed_out, DatabaseError::ConnectionFailed(_)));
        assert!(matches!(closed, DatabaseError::ConnectionFailed(_)));
    }

    #[test]
    fn test_io_error_maps_to_connection_failed() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: DatabaseError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
    }

    #[test]
    fn test_column_errors_map_to_query_failed() {
        let err: DatabaseError = sqlx::Error::ColumnNotFound("email".to_string()).into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }

    #[test]
    fn test_in_operation_keeps_kind_and_adds_context() {
        let err = DatabaseError::NotFound("comment 7".to_string()).in_operation("comment.find_by_id");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(
            err.to_string(),
            "Record not found: comment.find_by_id: comment 7"
        );
    }

    #[test]
    fn test_in_operation_prefixes_every_kind() {
        let errors = vec![
            DatabaseError::ConnectionFailed("x".to_string()),
            DatabaseError::HealthCheckFailed("x".to_string()),
            DatabaseError::QueryFailed("x".to_string()),
            DatabaseError::TransactionFailed("x".to_string()),
            DatabaseError::NotFound("x".to_string()),
            DatabaseError::IdentityRetrievalFailed("x".to_string()),
            DatabaseError::UnsupportedBackend("x".to_string()),
        ];

        for err in errors {
            let kind = err.kind();
            let err = err.in_operation("pool.new");
            assert_eq!(err.kind(), kind);
            assert!(err.to_string().contains("pool.new: x"), "{err}");
        }
    }
}
