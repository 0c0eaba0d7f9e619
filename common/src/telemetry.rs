// Structured logging and Prometheus metrics setup

use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured JSON logging.
///
/// `RUST_LOG` wins over the configured level so operators can raise
/// verbosity without touching config files.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level, "Structured logging initialized");
    Ok(())
}

/// Install the Prometheus exporter and describe the sweeper's metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "sweep_rescheduled_total",
        "Total number of posts moved to a better slot"
    );
    describe_counter!(
        "sweep_unchanged_total",
        "Total number of posts evaluated and left in place"
    );
    describe_counter!(
        "sweep_post_failures_total",
        "Total number of per-post sweep failures"
    );
    describe_histogram!(
        "training_duration_seconds",
        "Duration of model training runs in seconds"
    );
    describe_gauge!("monitored_posts", "Number of posts under performance monitoring");

    tracing::info!(
        metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );
    Ok(())
}
