// Comment repository implementation
// Insert, lookup and listing over the `comments` table, plus the prepared
// and transactional batch inserts.

use super::finish;
use crate::db::context::{QueryContext, Stage};
use crate::db::{Backend, DbPool};
use crate::errors::DatabaseError;
use crate::models::{Comment, NewComment};
use sqlx::any::AnyQueryResult;
use sqlx::{Any, AnyConnection, Executor, Statement, Transaction};
use std::time::Instant;
use tracing::{instrument, warn};

const INSERT_COMMENT: &str = "INSERT INTO comments (email, comment) VALUES (?, ?)";

const SELECT_COMMENT: &str = "SELECT id, email, comment FROM comments";

const SELECT_COMMENT_BY_ID: &str = "SELECT id, email, comment FROM comments WHERE id = ? LIMIT 1";

// Per connection, so it must run on the connection that did the insert
const SELECT_LAST_ROWID: &str = "SELECT last_insert_rowid()";

/// Repository for comment-related database operations
///
/// Borrows the caller's pool for the lifetime of the repository; the pool's
/// lifecycle stays with the caller.
#[derive(Debug, Clone, Copy)]
pub struct CommentRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> CommentRepository<'a> {
    /// Create a new CommentRepository
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a comment and return it with the store-generated id
    ///
    /// The insert and the id lookup share one transaction, so a failed lookup
    /// leaves no row behind.
    ///
    /// # Errors
    /// - `QueryFailed` if the statement is rejected
    /// - `IdentityRetrievalFailed` if the store reports no generated id
    #[instrument(skip_all)]
    pub async fn insert(
        &self,
        ctx: &QueryContext,
        comment: &NewComment,
    ) -> Result<Comment, DatabaseError> {
        let started = Instant::now();
        let backend = self.pool.backend();
        let result: Result<Comment, DatabaseError> = async {
            let mut tx = self.pool.begin(ctx).await?;
            let id = ctx
                .run(Stage::Statement, execute_insert(&mut *tx, backend, comment))
                .await?;
            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed(format!("commit failed: {}", e)))?;
            Ok(comment.clone().with_id(id))
        }
        .await;

        let comment = finish("comment.insert", started, result)?;
        tracing::info!(comment_id = comment.id, "Comment inserted");
        Ok(comment)
    }

    /// Find a comment by its id
    ///
    /// # Errors
    /// - `NotFound` if no row has this id
    /// - `QueryFailed` on execution or scan failure
    #[instrument(skip(self, ctx))]
    pub async fn find_by_id(&self, ctx: &QueryContext, id: i64) -> Result<Comment, DatabaseError> {
        let started = Instant::now();
        let result: Result<Comment, DatabaseError> = async {
            let mut conn = self.pool.acquire(ctx).await?;
            ctx.run(Stage::Statement, async {
                sqlx::query_as::<_, Comment>(SELECT_COMMENT_BY_ID)
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Comment not found: {}", id)))
        }
        .await;

        finish("comment.find_by_id", started, result)
    }

    /// Fetch every comment in store order
    ///
    /// Rows are collected before returning; a failure part-way through
    /// discards what was already read.
    #[instrument(skip_all)]
    pub async fn find_all(&self, ctx: &QueryContext) -> Result<Vec<Comment>, DatabaseError> {
        let started = Instant::now();
        let result: Result<Vec<Comment>, DatabaseError> = async {
            let mut conn = self.pool.acquire(ctx).await?;
            ctx.run(Stage::Statement, async {
                sqlx::query_as::<_, Comment>(SELECT_COMMENT)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await
        }
        .await;

        let comments = finish("comment.find_all", started, result)?;
        tracing::debug!(count = comments.len(), "Found comments");
        Ok(comments)
    }

    /// Number of rows in the comments table
    #[instrument(skip_all)]
    pub async fn count(&self, ctx: &QueryContext) -> Result<i64, DatabaseError> {
        let started = Instant::now();
        let result: Result<i64, DatabaseError> = async {
            let mut conn = self.pool.acquire(ctx).await?;
            ctx.run(Stage::Statement, async {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments")
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await
        }
        .await;

        finish("comment.count", started, result)
    }

    /// Insert many comments through one prepared statement on one connection
    ///
    /// Not atomic: rows inserted before a failure stay in the table, and the
    /// error says how many made it. Use [`Self::insert_batch`] for
    /// all-or-nothing semantics.
    #[instrument(skip_all, fields(rows = comments.len()))]
    pub async fn insert_prepared(
        &self,
        ctx: &QueryContext,
        comments: &[NewComment],
    ) -> Result<Vec<Comment>, DatabaseError> {
        let started = Instant::now();
        let backend = self.pool.backend();
        let result: Result<Vec<Comment>, DatabaseError> = async {
            let mut inserted = Vec::with_capacity(comments.len());
            if comments.is_empty() {
                return Ok(inserted);
            }

            let mut conn = self.pool.acquire(ctx).await?;
            let statement = ctx
                .run(Stage::Statement, async {
                    (&mut *conn)
                        .prepare(INSERT_COMMENT)
                        .await
                        .map_err(DatabaseError::from)
                })
                .await?;

            for (index, comment) in comments.iter().enumerate() {
                let executed: Result<i64, DatabaseError> = ctx
                    .run(Stage::Statement, async {
                        let done = statement
                            .query()
                            .bind(comment.email.as_str())
                            .bind(comment.comment.as_str())
                            .execute(&mut *conn)
                            .await
                            .map_err(DatabaseError::from)?;
                        generated_id(&mut *conn, backend, &done).await
                    })
                    .await;

                match executed {
                    Ok(id) => inserted.push(comment.clone().with_id(id)),
                    Err(err) => {
                        return Err(with_row_context(err, index, comments.len(), inserted.len()));
                    }
                }
            }

            Ok(inserted)
        }
        .await;

        let inserted = finish("comment.insert_prepared", started, result)?;
        tracing::info!(count = inserted.len(), "Comments inserted through prepared statement");
        Ok(inserted)
    }

    /// Insert many comments inside one transaction
    ///
    /// Either every row is committed or none is: the first failure (or an
    /// expired deadline) rolls the whole batch back.
    #[instrument(skip_all, fields(rows = comments.len()))]
    pub async fn insert_batch(
        &self,
        ctx: &QueryContext,
        comments: &[NewComment],
    ) -> Result<Vec<Comment>, DatabaseError> {
        let started = Instant::now();
        let backend = self.pool.backend();
        let result: Result<Vec<Comment>, DatabaseError> = async {
            let mut inserted = Vec::with_capacity(comments.len());
            if comments.is_empty() {
                return Ok(inserted);
            }

            let mut tx = self.pool.begin(ctx).await?;

            for (index, comment) in comments.iter().enumerate() {
                let executed = ctx
                    .run(Stage::Statement, execute_insert(&mut *tx, backend, comment))
                    .await;

                match executed {
                    Ok(id) => inserted.push(comment.clone().with_id(id)),
                    Err(err) => {
                        roll_back(ctx, tx, inserted.len()).await;
                        return Err(with_row_context(err, index, comments.len(), 0));
                    }
                }
            }

            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed(format!("commit failed: {}", e)))?;

            Ok(inserted)
        }
        .await;

        let inserted = finish("comment.insert_batch", started, result)?;
        tracing::info!(count = inserted.len(), "Comment batch committed");
        Ok(inserted)
    }
}

/// Run the insert statement and read back the id it generated
async fn execute_insert(
    conn: &mut AnyConnection,
    backend: Backend,
    comment: &NewComment,
) -> Result<i64, DatabaseError> {
    let done = sqlx::query(INSERT_COMMENT)
        .bind(comment.email.as_str())
        .bind(comment.comment.as_str())
        .execute(&mut *conn)
        .await?;

    generated_id(conn, backend, &done).await
}

/// Id generated by the insert that produced `done`
///
/// MySQL reports it in the insert result. The SQLite driver leaves it out,
/// so it is read back on the same connection.
async fn generated_id(
    conn: &mut AnyConnection,
    backend: Backend,
    done: &AnyQueryResult,
) -> Result<i64, DatabaseError> {
    let reported = match backend {
        Backend::MySql => done.last_insert_id(),
        Backend::Sqlite => Some(
            sqlx::query_scalar::<_, i64>(SELECT_LAST_ROWID)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| DatabaseError::IdentityRetrievalFailed(e.to_string()))?,
        ),
    };

    checked_id(reported)
}

fn checked_id(reported: Option<i64>) -> Result<i64, DatabaseError> {
    match reported {
        Some(id) if id > 0 => Ok(id),
        Some(id) => Err(DatabaseError::IdentityRetrievalFailed(format!(
            "store returned non-positive id {}",
            id
        ))),
        None => Err(DatabaseError::IdentityRetrievalFailed(
            "store did not report a generated id".to_string(),
        )),
    }
}

/// Roll back a failed batch without outliving the caller's deadline
///
/// Past the deadline the transaction is dropped unpolled; sqlx then queues
/// the rollback on the connection instead of waiting for it here.
async fn roll_back(ctx: &QueryContext, tx: Transaction<'static, Any>, kept: usize) {
    let rolled_back = ctx
        .run(Stage::Statement, async move {
            tx.rollback().await.map_err(DatabaseError::from)
        })
        .await;

    match rolled_back {
        Ok(()) => warn!(rolled_back = kept, "Batch rolled back"),
        Err(err) => warn!(error = %err, "Explicit rollback abandoned, transaction dropped"),
    }
}

fn with_row_context(err: DatabaseError, index: usize, total: usize, kept: usize) -> DatabaseError {
    let context = format!("row {} of {} ({} rows kept)", index + 1, total, kept);
    match err {
        DatabaseError::QueryFailed(msg) => DatabaseError::QueryFailed(format!("{context}: {msg}")),
        DatabaseError::ConnectionFailed(msg) => {
            DatabaseError::ConnectionFailed(format!("{context}: {msg}"))
        }
        DatabaseError::IdentityRetrievalFailed(msg) => {
            DatabaseError::IdentityRetrievalFailed(format!("{context}: {msg}"))
        }
        other => other,
    }
}
