//! Prometheus metrics for the RDR server

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

use crate::api::API_PREFIX;

lazy_static! {
    // HTTP

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rdr_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "rdr_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "rdr_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    // Physical measurements

    /// Inserts by outcome: created, duplicate, amendment
    pub static ref PHYSICAL_MEASUREMENTS_INSERTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rdr_physical_measurements_inserts_total",
        "Physical measurements submissions by outcome",
        &["outcome"]
    )
    .expect("Failed to register PHYSICAL_MEASUREMENTS_INSERTS_TOTAL");

    /// Cancel/restore requests by requested status
    pub static ref PHYSICAL_MEASUREMENTS_PATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rdr_physical_measurements_patches_total",
        "Physical measurements cancel/restore requests",
        &["status"]
    )
    .expect("Failed to register PHYSICAL_MEASUREMENTS_PATCHES_TOTAL");

    pub static ref MEASUREMENTS_PER_RECORD: HistogramVec = register_histogram_vec!(
        "rdr_measurements_per_record",
        "Measurements (including components) stored per physical measurements record",
        &["source"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .expect("Failed to register MEASUREMENTS_PER_RECORD");
}

fn is_identifier(segment: &str) -> bool {
    let digits = segment.strip_prefix('P').unwrap_or(segment);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Replace participant and record ids with `{id}` to bound label cardinality
pub fn sanitize_path(path: &str) -> String {
    let rest = path.strip_prefix(API_PREFIX).unwrap_or(path);
    if rest.is_empty() || rest == "/" {
        return "/".to_string();
    }

    let sanitized: Vec<&str> = rest
        .split('/')
        .map(|segment| if is_identifier(segment) { "{id}" } else { segment })
        .collect();
    sanitized.join("/")
}

/// First API path segment (`Participant`, `PhysicalMeasurements`, ...)
pub fn extract_resource_type(path: &str) -> Option<String> {
    let rest = path.strip_prefix(API_PREFIX)?;
    rest.split('/')
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}
