//! Staff account routes. Public; login is how a token is obtained.

use crate::api::handlers::staff;
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/staff/create", post(staff::create_staff))
        .route("/staff/login", post(staff::login))
}
