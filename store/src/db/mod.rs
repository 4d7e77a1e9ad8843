// Database layer module
// Caller-owned pool, per-call deadlines, schema bootstrap and repositories

pub mod context;
pub mod pool;
pub mod repositories;
pub mod schema;

pub use context::QueryContext;
pub use pool::{Backend, DbPool};
