// Canonical table definitions for the supported backends
// Repositories assume these tables exist; this only bootstraps them.

use crate::db::pool::{Backend, DbPool};
use crate::errors::DatabaseError;
use tracing::{info, instrument};

const MYSQL_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BIGINT NOT NULL AUTO_INCREMENT,
        email VARCHAR(100) NOT NULL,
        comment TEXT NOT NULL,
        PRIMARY KEY (id)
    ) ENGINE = InnoDB
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        username VARCHAR(100) NOT NULL,
        password VARCHAR(100) NOT NULL,
        display_name VARCHAR(100) NULL,
        PRIMARY KEY (username)
    ) ENGINE = InnoDB
    "#,
];

const SQLITE_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        comment TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY NOT NULL,
        password TEXT NOT NULL,
        display_name TEXT NULL
    )
    "#,
];

/// DDL statements for `backend`, in creation order
pub fn statements(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::MySql => MYSQL_DDL,
        Backend::Sqlite => SQLITE_DDL,
    }
}

/// Create the `comments` and `users` tables if they are missing
#[instrument(skip(pool), fields(backend = %pool.backend()))]
pub async fn ensure_schema(pool: &DbPool) -> Result<(), DatabaseError> {
    for ddl in statements(pool.backend()) {
        sqlx::query(ddl)
            .execute(pool.pool())
            .await
            .map_err(|e| DatabaseError::from(e).in_operation("schema.ensure"))?;
    }

    info!("Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_backend_defines_both_tables() {
        for backend in [Backend::MySql, Backend::Sqlite] {
            let ddl = statements(backend);
            assert_eq!(ddl.len(), 2);
            assert!(ddl[0].contains("comments"));
            assert!(ddl[1].contains("users"));
            assert!(ddl[1].contains("display_name"));
        }
    }
}
