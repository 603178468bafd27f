//! API layer - routes, handlers, and middleware

pub mod extractors;
pub mod handlers;
pub mod headers;
pub mod middleware;
pub mod routes;

use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;

/// Every resource route lives under this prefix
pub const API_PREFIX: &str = "/rdr/v1";

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_request_body_size;
    let cors_origins = state.config.server.cors_origins.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/favicon.ico", get(favicon))
        .merge(routes::metrics::metrics_routes())
        .nest(API_PREFIX, routes::rdr::rdr_routes())
        .with_state(state)
        // Applied in reverse order
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(middleware::compression())
        .layer(middleware::cors(&cors_origins))
        .layer(middleware::trace())
        .layer(DefaultBodyLimit::max(max_body_size))
}

/// Healthy when a store transaction can be opened
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.begin().await {
        Ok(tx) => tx.rollback().await,
        Err(e) => Err(e),
    };
    match store {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "service": "rdr-server"})),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "service": "rdr-server"})),
            )
        }
    }
}

async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "server": "RDR",
            "version": env!("CARGO_PKG_VERSION"),
            "api": API_PREFIX,
            "status": "running"
        })),
    )
}

async fn favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
