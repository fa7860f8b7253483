//! Prometheus metrics for account-sync-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

/// Counter for sync runs by final status.
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "account_sync_runs_total",
        "Total number of sync runs",
        &["status"]
    )
    .expect("Failed to register SYNC_RUNS")
});

/// Histogram for whole-run duration.
pub static SYNC_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "account_sync_run_duration_seconds",
        "Sync run duration in seconds",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to register SYNC_DURATION")
});

/// Counter for per-account reconciliations by result.
pub static ACCOUNT_RECONCILIATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "account_sync_reconciliations_total",
        "Total number of account reconciliations",
        &["status"]
    )
    .expect("Failed to register ACCOUNT_RECONCILIATIONS")
});

/// Histogram for attempts spent per account.
pub static RECONCILE_ATTEMPTS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "account_sync_reconcile_attempts",
        "Attempts spent reconciling one account",
        vec![1.0, 2.0, 3.0, 5.0, 10.0]
    )
    .expect("Failed to register RECONCILE_ATTEMPTS")
});

/// Counter for HTTP requests by method, route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "account_sync_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for HTTP request duration.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "account_sync_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&SYNC_DURATION);
    Lazy::force(&ACCOUNT_RECONCILIATIONS);
    Lazy::force(&RECONCILE_ATTEMPTS);
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&HTTP_REQUEST_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a finished, coalesced or failed run.
pub fn record_sync_run(status: &str) {
    SYNC_RUNS.with_label_values(&[status]).inc();
}

pub fn record_sync_duration(duration_secs: f64) {
    SYNC_DURATION.observe(duration_secs);
}

/// Record the final result of one account.
pub fn record_account_reconciliation(success: bool) {
    let status = if success { "success" } else { "failure" };
    ACCOUNT_RECONCILIATIONS.with_label_values(&[status]).inc();
}

pub fn record_reconcile_attempts(attempts: u32) {
    RECONCILE_ATTEMPTS.observe(f64::from(attempts));
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: &str, duration_secs: f64) {
    HTTP_REQUESTS
        .with_label_values(&[method, path, status])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, path])
        .observe(duration_secs);
}
