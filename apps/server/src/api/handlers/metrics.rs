//! Metrics endpoint handler

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};

use crate::{
    metrics::{DB_CONNECTIONS_ACTIVE, DB_CONNECTIONS_IDLE},
    state::AppState,
};

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Pool gauges are sampled at scrape time.
    if let Some(pool) = &state.db_pool {
        let idle = pool.num_idle() as i64;
        DB_CONNECTIONS_IDLE.set(idle);
        DB_CONNECTIONS_ACTIVE.set(i64::from(pool.size()) - idle);
    }

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}
