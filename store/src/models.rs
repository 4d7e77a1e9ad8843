// Row types for the comments and users tables

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Comment as supplied by a caller, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub email: String,
    pub comment: String,
}

impl NewComment {
    pub fn new(email: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            comment: comment.into(),
        }
    }

    /// Attach the store-generated id
    pub fn with_id(self, id: i64) -> Comment {
        Comment {
            id,
            email: self.email,
            comment: self.comment,
        }
    }
}

/// A persisted comment. `id` is always the store-generated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub email: String,
    pub comment: String,
}

/// Account row returned by a successful credential check.
///
/// `display_name` is a nullable column and stays `None` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub username: String,
    pub display_name: Option<String>,
}

/// Result of a credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success(Account),
    Failed,
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
