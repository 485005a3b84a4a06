//! API layer - routes, handlers, and middleware

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_request_body_size;
    let cors_origins = state.config.server.cors_origins.clone();

    // `route_layer` so unknown paths still 404 instead of 401.
    let patient_router = routes::patient::patient_routes().route_layer(
        axum::middleware::from_fn_with_state(state.clone(), crate::auth::auth_middleware),
    );

    Router::new()
        .route("/health", get(health_check))
        .merge(routes::metrics::metrics_routes())
        .merge(routes::staff::staff_routes())
        .merge(patient_router)
        .with_state(state)
        // Applied in reverse order
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(middleware::compression())
        .layer(middleware::cors(&cors_origins))
        .layer(DefaultBodyLimit::max(max_body_size))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
