//! Per-request root span, request ids and trace id headers

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use opentelemetry::trace::TraceContextExt;
use std::time::Instant;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

/// Opens the root span of each HTTP request.
///
/// The server always assigns its own `x-request-id`; a client-supplied id that differs is
/// echoed back in `x-correlation-id`. The trace id goes out in `x-trace-id`.
#[tracing::instrument(
    name = "http_request",
    skip_all,
    fields(
        http.method = %req.method(),
        http.route = %req.uri().path(),
        otel.kind = "server",
        http.response.status_code = tracing::field::Empty,
        rdr.resource = tracing::field::Empty,
        rdr.participant_id = tracing::field::Empty,
        request_id = tracing::field::Empty,
    )
)]
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let current_span = Span::current();
    let start = Instant::now();

    let client_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let server_id = Uuid::new_v4().to_string();
    current_span.record("request_id", &server_id);

    let path = req.uri().path().to_string();
    let method = req.method().clone();
    if let Some(resource) = crate::metrics::extract_resource_type(&path) {
        current_span.record("rdr.resource", &resource);
    }
    if let Some(participant_id) = participant_in_path(&path) {
        current_span.record("rdr.participant_id", participant_id);
    }

    tracing::debug!(method = %method, path = %path, request_id = %server_id, "Incoming request");

    let mut response = next.run(req).await;

    let status = response.status();
    current_span.record("http.response.status_code", status.as_u16());
    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = start.elapsed().as_millis(),
        request_id = %server_id,
        "Request completed"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&server_id) {
        headers.insert("x-request-id", value);
    }

    let trace_id = current_span
        .context()
        .span()
        .span_context()
        .trace_id()
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        headers.insert("x-trace-id", value);
    }

    if let Some(client_id) = client_id.filter(|id| *id != server_id) {
        if let Ok(value) = HeaderValue::from_str(&client_id) {
            headers.insert("x-correlation-id", value);
        }
    }

    response
}

/// `P123` from `/rdr/v1/Participant/P123/...`
fn participant_in_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    segments.find(|segment| *segment == "Participant")?;
    segments.next().filter(|id| id.starts_with('P'))
}
