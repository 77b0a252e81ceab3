// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::{JournalError, Result};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const ATOMIC_WRITES_TOTAL: &str = "rowjournal_atomic_writes_total";
pub const WRITE_FAILURES_TOTAL: &str = "rowjournal_write_failures_total";
pub const WRITE_DURATION_SECONDS: &str = "rowjournal_write_duration_seconds";
pub const REPLAY_PAGES_TOTAL: &str = "rowjournal_replay_pages_total";
pub const REPLAY_DECODE_FAILURES_TOTAL: &str = "rowjournal_replay_decode_failures_total";
pub const WATERMARK: &str = "rowjournal_watermark";
pub const TRACKER_GAPS_SKIPPED_TOTAL: &str = "rowjournal_tracker_gaps_skipped_total";
pub const TRACKER_POLL_FAILURES_TOTAL: &str = "rowjournal_tracker_poll_failures_total";

/// Initialize telemetry (logs + metrics)
///
/// With `metrics_addr` the exporter serves `/metrics` itself; otherwise the
/// recorder is installed and [`render_metrics`] returns the text format.
/// Must run inside a tokio runtime when an address is given.
pub fn init_telemetry(metrics_addr: Option<SocketAddr>) -> Result<()> {
    // 1. Tracing (logs)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rowjournal_node=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| JournalError::Config(format!("tracing already initialized: {}", e)))?;

    // 2. Metrics (Prometheus)
    let builder = PrometheusBuilder::new();
    match metrics_addr {
        Some(addr) => {
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| JournalError::Config(format!("metrics exporter: {}", e)))?;
            tracing::info!("Prometheus exporter listening on {}", addr);
        }
        None => {
            let handle = builder
                .install_recorder()
                .map_err(|e| JournalError::Config(format!("metrics recorder: {}", e)))?;
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
    }

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(ATOMIC_WRITES_TOTAL, "Atomic writes committed");
    metrics::describe_counter!(WRITE_FAILURES_TOTAL, "Atomic writes that failed, by kind");
    metrics::describe_histogram!(WRITE_DURATION_SECONDS, "Time taken to commit one atomic write");
    metrics::describe_counter!(REPLAY_PAGES_TOTAL, "Pages fetched by replay cursors");
    metrics::describe_counter!(REPLAY_DECODE_FAILURES_TOTAL, "Rows that failed to decode during replay");
    metrics::describe_gauge!(WATERMARK, "Highest gap-free ordering offset");
    metrics::describe_counter!(TRACKER_GAPS_SKIPPED_TOTAL, "Gaps declared permanently skipped");
    metrics::describe_counter!(TRACKER_POLL_FAILURES_TOTAL, "Tracker storage queries that failed");

    metrics::gauge!(WATERMARK, 0.0);
}

/// Get the Prometheus text exposition, when the recorder owns no listener.
pub fn render_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
