// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Initialize Tracing (Logs)
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lineage_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    // 2. Initialize Metrics (Prometheus)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::warn!("Prometheus recorder not installed: {}", e),
    }

    metrics::describe_counter!("lineage_blocks_appended_total", "Blocks appended to the ledger, by action");
    metrics::describe_counter!("lineage_reverts_total", "Completed coordinated reverts");
    metrics::describe_counter!("lineage_lock_contention_total", "Exclusive lock acquisitions that timed out");
    metrics::describe_counter!("lineage_finetune_failures_total", "Fine-tuning runs that failed or timed out");
    metrics::describe_histogram!("lineage_finetune_duration_seconds", "Fine-tuning wall time");
    metrics::describe_histogram!("lineage_generate_duration_seconds", "Generation wall time");
    metrics::describe_gauge!("lineage_ledger_length", "Blocks currently on the ledger");
    metrics::describe_gauge!("lineage_checkpoint_size_bytes", "Size of the last saved checkpoint body");

    // Ensure at least one metric exists on startup
    metrics::gauge!("lineage_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
