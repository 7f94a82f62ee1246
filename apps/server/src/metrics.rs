//! Prometheus metrics for the reference-range service.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "labsync_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "labsync_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    /// In-flight HTTP requests
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "labsync_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    // Range Synchronization Metrics

    /// Sync calls by outcome (applied, unchanged, rejected, lock_timeout, failed)
    pub static ref RANGE_SYNC_TOTAL: IntCounterVec = register_int_counter_vec!(
        "labsync_range_sync_total",
        "Total number of reference-range synchronizations",
        &["outcome"]
    )
    .expect("Failed to register RANGE_SYNC_TOTAL");

    /// End-to-end sync duration, lock wait included
    pub static ref RANGE_SYNC_DURATION_SECONDS: Histogram = register_histogram!(
        "labsync_range_sync_duration_seconds",
        "Reference-range synchronization duration in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register RANGE_SYNC_DURATION_SECONDS");

    /// Rows written by the applier (insert, update, delete)
    pub static ref RANGE_ROWS_WRITTEN_TOTAL: IntCounterVec = register_int_counter_vec!(
        "labsync_range_rows_written_total",
        "Reference-range rows written",
        &["op"]
    )
    .expect("Failed to register RANGE_ROWS_WRITTEN_TOTAL");

    pub static ref RANGE_LOCK_TIMEOUTS_TOTAL: IntCounter = register_int_counter!(
        "labsync_range_lock_timeouts_total",
        "Synchronizations that gave up waiting for the per-parameter lock"
    )
    .expect("Failed to register RANGE_LOCK_TIMEOUTS_TOTAL");

    pub static ref SEX_COERCIONS_TOTAL: IntCounter = register_int_counter!(
        "labsync_sex_coercions_total",
        "Unrecognized sex tokens coerced to Ambos"
    )
    .expect("Failed to register SEX_COERCIONS_TOTAL");
}

/// Replace numeric path segments so ids do not blow up label cardinality.
pub fn sanitize_path(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    path.split('/')
        .map(|segment| if is_id(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Name of the range operation a request maps to, for span tagging.
pub fn range_operation(method: &str, path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        ("PUT", ["parameters", id, "reference-ranges"]) if is_id(id) => Some("sync"),
        ("GET", ["parameters", id, "reference-ranges"]) if is_id(id) => Some("list"),
        ("POST", ["parameters", id, "reference-ranges", "plan"]) if is_id(id) => Some("plan"),
        ("GET", ["studies", id, "parameters", "detailed"]) if is_id(id) => Some("study_listing"),
        ("GET", ["admin", "reference-ranges", "audit"]) => Some("audit"),
        _ => None,
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
