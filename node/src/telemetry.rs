// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Initialize Tracing (Logs)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tessera_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Initialize Metrics (Prometheus)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::error!("Failed to install Prometheus recorder: {}", e),
    }

    metrics::describe_counter!("tessera_tx_committed_total", "Transactions durably committed, per database");
    metrics::describe_histogram!("tessera_tx_commit_duration_seconds", "Time to append, fsync and apply a transaction");
    metrics::describe_counter!("tessera_replication_applied_total", "Transactions applied by replication sessions");
    metrics::describe_gauge!("tessera_replication_lag", "Transactions the replica is behind the observed master head");
    metrics::describe_counter!("tessera_replication_failures_total", "Replication sessions that entered Failed");

    metrics::gauge!("tessera_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
