//! Layer factories for middleware

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
};

/// Spans come from `request_id_middleware`; no tower-http trace layer is installed
pub fn trace() -> tower::layer::util::Identity {
    tower::layer::util::Identity::new()
}

/// CORS for the configured origins only; none configured means no CORS headers
pub fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if allowed.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::IF_MATCH, header::AUTHORIZATION])
        .expose_headers([
            header::ETAG,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-trace-id"),
        ])
}

pub fn compression() -> CompressionLayer {
    CompressionLayer::new()
}
