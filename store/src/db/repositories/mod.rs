// Repository layer for database operations
// Every user-supplied value reaches the store as a bound parameter.

pub mod account;
pub mod comment;

pub use account::AccountRepository;
pub use comment::CommentRepository;

use crate::errors::DatabaseError;
use crate::telemetry;
use std::time::Instant;

/// Attach the operation name to a failure, then log and record the outcome.
pub(crate) fn finish<T>(
    operation: &'static str,
    started: Instant,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    let elapsed = started.elapsed();
    match result {
        Ok(value) => {
            telemetry::record_query(operation, "ok", elapsed);
            Ok(value)
        }
        Err(err) => {
            let err = err.in_operation(operation);
            telemetry::record_query(operation, err.kind(), elapsed);
            match err {
                DatabaseError::NotFound(_) => tracing::debug!(error = %err, "Lookup found no rows"),
                _ => tracing::error!(error = %err, kind = err.kind(), "Repository operation failed"),
            }
            Err(err)
        }
    }
}
