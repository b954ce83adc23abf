//! Tracing, the Prometheus recorder and shutdown signal handling.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    // Per-statement sqlx logging drowns out grading spans; opt back in
    // through RUST_LOG when debugging queries.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", telemetry.log_level)));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let result = if telemetry.json { builder.json().try_init() } else { builder.try_init() };
    result.map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

pub(crate) fn init_metrics(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe_metrics() {
    metrics::describe_counter!(
        "grading_submissions_total",
        "Grading requests that ran to completion"
    );
    metrics::describe_counter!(
        "grading_cases_total",
        "Sandbox test-case executions, labeled by verdict"
    );
    metrics::describe_histogram!(
        "grading_submission_duration_seconds",
        "Wall time spent grading one submission"
    );
    metrics::describe_counter!("http_requests_total", "HTTP responses, labeled by status");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency, labeled by status"
    );
}

/// Resolves on Ctrl+C or SIGTERM so that in-flight grading requests
/// drain before the listener closes.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, draining in-flight grading requests"),
        _ = sigterm => tracing::info!("SIGTERM received, draining in-flight grading requests"),
    }
}
