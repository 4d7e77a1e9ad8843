// Walkthrough binary entry point
// Runs each data-access lesson in order against the configured database

use anyhow::{Context, Result};
use std::time::Duration;
use store::config::Settings;
use store::db::repositories::{AccountRepository, CommentRepository};
use store::db::schema::ensure_schema;
use store::db::{DbPool, QueryContext};
use store::errors::DatabaseError;
use store::models::NewComment;
use store::telemetry;
use tracing::{error, info, warn};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize tracing
    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.log_format,
    )?;

    info!("Starting comment store walkthrough");

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    // Initialize database pool
    let pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        anyhow::anyhow!("Database initialization error: {}", e)
    })?;
    pool.health_check()
        .await
        .context("Database health check failed")?;

    let outcome = run_lessons(&pool).await;

    pool.close().await;
    info!("Database pool closed");

    outcome
}

async fn run_lessons(pool: &DbPool) -> Result<()> {
    ensure_schema(pool)
        .await
        .context("Failed to create schema")?;
    info!("Schema ready");

    let comments = CommentRepository::new(pool);

    // Insert one comment and read it back by its generated id
    let ctx = QueryContext::with_timeout(STEP_TIMEOUT);
    let saved = comments
        .insert(&ctx, &NewComment::new("izzan@example.com", "Hello from the walkthrough"))
        .await
        .context("Insert failed")?;
    let found = comments
        .find_by_id(&ctx, saved.id)
        .await
        .context("Lookup by id failed")?;
    info!(id = found.id, email = %found.email, comment = %found.comment, "Comment read back");

    match comments.find_by_id(&ctx, i64::MAX).await {
        Err(DatabaseError::NotFound(msg)) => info!(detail = %msg, "Unknown id reported as not found"),
        Err(e) => return Err(e).context("Lookup of unknown id failed"),
        Ok(comment) => warn!(id = comment.id, "Unexpected row for unknown id"),
    }

    // List everything currently stored
    let ctx = QueryContext::with_timeout(STEP_TIMEOUT);
    let all = comments.find_all(&ctx).await.context("Listing failed")?;
    info!(count = all.len(), "Listed comments");
    for comment in &all {
        tracing::debug!(id = comment.id, email = %comment.email, "Comment");
    }

    // One prepared statement reused for ten rows
    let ctx = QueryContext::with_timeout(STEP_TIMEOUT);
    let prepared = comments
        .insert_prepared(&ctx, &lesson_batch("prepared"))
        .await
        .context("Prepared insert failed")?;
    info!(
        first_id = prepared.first().map(|c| c.id),
        last_id = prepared.last().map(|c| c.id),
        "Prepared insert finished"
    );

    // Ten rows committed as one unit
    let ctx = QueryContext::with_timeout(STEP_TIMEOUT);
    let committed = comments
        .insert_batch(&ctx, &lesson_batch("transaction"))
        .await
        .context("Transactional insert failed")?;
    info!(count = committed.len(), "Transactional insert committed");

    let total = comments.count(&ctx).await.context("Count failed")?;
    info!(total = total, "Comments stored");

    // Credential check with bound parameters
    let accounts = AccountRepository::new(pool);
    let ctx = QueryContext::with_timeout(STEP_TIMEOUT);
    match accounts
        .create(&ctx, "admin", "admin", Some("Administrator"))
        .await
    {
        Ok(()) => {}
        Err(DatabaseError::QueryFailed(msg)) => {
            warn!(detail = %msg, "Account not created, assuming it already exists")
        }
        Err(e) => return Err(e).context("Account creation failed"),
    }

    let genuine = accounts
        .login(&ctx, "admin", "admin")
        .await
        .context("Credential check failed")?;
    info!(success = genuine.is_success(), "Login with real credentials");

    let injected = accounts
        .login(&ctx, "admin'; #", "anything")
        .await
        .context("Credential check failed")?;
    if injected.is_success() {
        anyhow::bail!("Quoted username logged in; parameters are not being bound");
    }
    info!(username = "admin'; #", "Injection attempt rejected");

    Ok(())
}

fn lesson_batch(label: &str) -> Vec<NewComment> {
    (1..=10)
        .map(|i| NewComment::new(format!("{label}{i}@example.com"), format!("{label} comment {i}")))
        .collect()
}
