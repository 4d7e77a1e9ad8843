// Per-call deadline carried into every repository operation

use crate::errors::DatabaseError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Bounds how long a repository call may wait on the store.
///
/// A context without a deadline waits as long as the pool's own acquire
/// timeout allows. Cancellation is the usual async kind: drop the future.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
}

/// Which stage of a call ran out of time; decides the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Statement,
}

impl QueryContext {
    /// Context with no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Run `fut` under this context's deadline.
    ///
    /// Store errors pass through unchanged; running out of time becomes
    /// `ConnectionFailed` while acquiring and `QueryFailed` afterwards.
    pub async fn run<T, F>(&self, stage: Stage, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        let Some(deadline) = self.deadline else {
            return fut.await;
        };
        if Instant::now() >= deadline {
            return Err(self.expired(stage));
        }

        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.expired(stage)),
        }
    }

    /// Error describing an exceeded deadline at `stage`
    pub fn expired(&self, stage: Stage) -> DatabaseError {
        match stage {
            Stage::Acquire => DatabaseError::ConnectionFailed(
                "deadline exceeded while waiting for a connection".to_string(),
            ),
            Stage::Statement => DatabaseError::QueryFailed(
                "deadline exceeded while the statement was running".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_has_no_deadline() {
        let ctx = QueryContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());

        let value = ctx.run(Stage::Statement, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_acquire_is_connection_error() {
        let ctx = QueryContext::with_timeout(Duration::from_millis(50));
        let result: Result<(), _> = ctx
            .run(Stage::Acquire, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
        assert!(ctx.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_statement_is_query_error() {
        let ctx = QueryContext::with_timeout(Duration::from_millis(50));
        let result: Result<(), _> = ctx
            .run(Stage::Statement, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let ctx = QueryContext::with_timeout(Duration::from_secs(5));
        let result: Result<(), _> = ctx
            .run(Stage::Statement, async {
                Err(DatabaseError::NotFound("comment 1".to_string()))
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
        assert!(ctx.remaining().unwrap() > Duration::ZERO);
    }
}
