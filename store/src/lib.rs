// Data-access library for the comments store: configuration, pool,
// repositories and the ambient logging/metrics setup shared by binaries

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod telemetry;
