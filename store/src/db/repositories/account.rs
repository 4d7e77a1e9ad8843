// Account repository implementation
// Credential lookups over the `users` table. Username and password are always
// bound, so quoting tricks such as `admin'; #` match nothing.

use super::finish;
use crate::db::context::{QueryContext, Stage};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Account, LoginOutcome};
use std::time::Instant;
use tracing::instrument;

const INSERT_USER: &str = "INSERT INTO users (username, password, display_name) VALUES (?, ?, ?)";

const SELECT_BY_CREDENTIALS: &str = r#"
    SELECT username, display_name
    FROM users
    WHERE username = ? AND password = ?
    LIMIT 1
"#;

/// Repository for account credential checks
#[derive(Debug, Clone, Copy)]
pub struct AccountRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new AccountRepository
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new account
    #[instrument(skip(self, ctx, password))]
    pub async fn create(
        &self,
        ctx: &QueryContext,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let started = Instant::now();
        let result: Result<(), DatabaseError> = async {
            let mut conn = self.pool.acquire(ctx).await?;
            ctx.run(Stage::Statement, async {
                sqlx::query(INSERT_USER)
                    .bind(username)
                    .bind(password)
                    .bind(display_name)
                    .execute(&mut *conn)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await?;
            Ok(())
        }
        .await;

        finish("account.create", started, result)?;
        tracing::info!(username = %username, "Account created");
        Ok(())
    }

    /// Find the account matching both username and password
    #[instrument(skip(self, ctx, password))]
    pub async fn find_by_credentials(
        &self,
        ctx: &QueryContext,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, DatabaseError> {
        let started = Instant::now();
        let result: Result<Option<Account>, DatabaseError> = async {
            let mut conn = self.pool.acquire(ctx).await?;
            ctx.run(Stage::Statement, async {
                sqlx::query_as::<_, Account>(SELECT_BY_CREDENTIALS)
                    .bind(username)
                    .bind(password)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await
        }
        .await;

        finish("account.find_by_credentials", started, result)
    }

    /// Check a username/password pair
    #[instrument(skip(self, ctx, password))]
    pub async fn login(
        &self,
        ctx: &QueryContext,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, DatabaseError> {
        match self.find_by_credentials(ctx, username, password).await? {
            Some(account) => {
                tracing::info!(username = %account.username, "Login success");
                Ok(LoginOutcome::Success(account))
            }
            None => {
                tracing::info!("Login failed");
                Ok(LoginOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::schema::ensure_schema;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, DbPool) {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("users.db").display()),
            max_open_connections: 2,
            max_idle_connections: 0,
            max_idle_time_seconds: 0,
            max_lifetime_seconds: 0,
            connect_timeout_seconds: 5,
        };
        let pool = DbPool::new(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_login_success_and_wrong_password() {
        let (_dir, pool) = setup().await;
        let repo = AccountRepository::new(&pool);
        let ctx = QueryContext::background();

        repo.create(&ctx, "admin", "izzan", Some("Administrator"))
            .await
            .unwrap();

        match repo.login(&ctx, "admin", "izzan").await.unwrap() {
            LoginOutcome::Success(account) => {
                assert_eq!(account.username, "admin");
                assert_eq!(account.display_name.as_deref(), Some("Administrator"));
            }
            LoginOutcome::Failed => panic!("expected login success"),
        }

        let outcome = repo.login(&ctx, "admin", "wrong").await.unwrap();
        assert_eq!(outcome, LoginOutcome::Failed);
    }

    #[tokio::test]
    async fn test_null_display_name_reads_back_as_none() {
        let (_dir, pool) = setup().await;
        let repo = AccountRepository::new(&pool);
        let ctx = QueryContext::background();

        repo.create(&ctx, "guest", "guest", None).await.unwrap();

        let account = repo
            .find_by_credentials(&ctx, "guest", "guest")
            .await
            .unwrap()
            .expect("account should exist");
        assert_eq!(account.display_name, None);
    }

    #[tokio::test]
    async fn test_injection_literal_does_not_log_in() {
        let (_dir, pool) = setup().await;
        let repo = AccountRepository::new(&pool);
        let ctx = QueryContext::background();

        repo.create(&ctx, "admin", "izzan", None).await.unwrap();

        let outcome = repo.login(&ctx, "admin'; #", "anything").await.unwrap();
        assert_eq!(outcome, LoginOutcome::Failed);

        let outcome = repo.login(&ctx, "admin' --", "anything").await.unwrap();
        assert_eq!(outcome, LoginOutcome::Failed);

        let outcome = repo.login(&ctx, "' OR '1'='1", "' OR '1'='1").await.unwrap();
        assert_eq!(outcome, LoginOutcome::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_query_error() {
        let (_dir, pool) = setup().await;
        let repo = AccountRepository::new(&pool);
        let ctx = QueryContext::background();

        repo.create(&ctx, "admin", "izzan", None).await.unwrap();
        let err = repo.create(&ctx, "admin", "other", None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
        assert!(err.to_string().contains("account.create"));
    }
}
