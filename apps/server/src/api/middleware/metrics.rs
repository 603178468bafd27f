//! Metrics middleware - tracks HTTP request metrics

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{
    sanitize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS,
};

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();

    // Sanitize path for metrics (remove IDs to reduce cardinality)
    let sanitized_path = sanitize_path(req.uri().path());

    HTTP_REQUESTS_IN_FLIGHT
        .with_label_values(&[&method, &sanitized_path])
        .inc();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &sanitized_path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &sanitized_path])
        .observe(duration);
    HTTP_REQUESTS_IN_FLIGHT
        .with_label_values(&[&method, &sanitized_path])
        .dec();

    response
}
