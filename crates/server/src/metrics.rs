//! Prometheus metrics for the depot server.
//!
//! Exposes counters for the upload lifecycle, chunk ingestion and commit
//! latency.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no upload ids or digests, only aggregate usage. The endpoint
//! should still be network-restricted to the scraper; set
//! `server.metrics_enabled = false` to remove it.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload session metrics
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_committed_total",
        "Total number of upload sessions successfully committed",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_expired_total",
        "Total number of upload sessions expired by the sweeper",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_aborted_total",
        "Total number of upload sessions abandoned by clients",
    )
    .expect("metric creation failed")
});

// Chunk metrics
pub static CHUNKS_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("depot_chunks_written_total", "Total number of chunks stored")
        .expect("metric creation failed")
});

pub static CHUNKS_RETRANSMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunks_retransmitted_total",
        "Total number of identical chunk retransmissions acknowledged without storing",
    )
    .expect("metric creation failed")
});

pub static BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_received_total",
        "Total chunk bytes stored",
    )
    .expect("metric creation failed")
});

// Artifact metrics
pub static ARTIFACTS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_artifacts_deduplicated_total",
        "Total number of commits whose artifact already existed",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static UPLOAD_COMMIT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_upload_commit_duration_seconds",
            "Time taken to commit an upload session",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static CHUNK_WRITE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_chunk_write_duration_seconds",
            "Time taken to store a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static DIGEST_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_digest_mismatches_total",
        "Total number of commits rejected because the assembled digest differed",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_upload_errors_total", "Total upload errors by kind"),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Current state gauges
pub static ACTIVE_UPLOAD_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "depot_active_upload_sessions",
        "Current number of live upload sessions",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers in one process.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_COMMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_EXPIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_ABORTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_WRITTEN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_RETRANSMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ARTIFACTS_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_COMMIT_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNK_WRITE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DIGEST_MISMATCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_UPLOAD_SESSIONS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload errors by kind.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}
