// Telemetry module for structured logging and query metrics

use crate::config::LogFormat;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// This function sets up the tracing subscriber with:
/// - JSON or human-readable formatting
/// - Span context in all log entries
/// - Log levels from `RUST_LOG` or the configured level
pub fn init_logging(log_level: &str, format: LogFormat) -> Result<()> {
    // Create environment filter from log level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, ?format, "Structured logging initialized");

    Ok(())
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - db_query_total: Counter of repository operations by operation and outcome
/// - db_query_duration_seconds: Histogram of repository operation latency
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "db_query_total",
        "Total number of repository operations by outcome"
    );
    describe_histogram!(
        "db_query_duration_seconds",
        "Duration of repository operations in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record one finished repository operation
///
/// `outcome` is `"ok"` or an error kind such as `"not_found"`.
#[inline]
pub fn record_query(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("db_query_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("db_query_duration_seconds", "operation" => operation).record(elapsed.as_secs_f64());
}
