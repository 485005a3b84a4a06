//! Patient API Routes
//!
//! All routes here require a staff token; the caller's hospital scopes every operation.
//! `/v1/patient/search` (static) takes precedence over `/v1/patient/:identifier`.

use crate::api::handlers::{patient, search};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/patient/search", post(search::legacy_search))
        .route("/v1/patient/search", post(search::scoped_search))
        .route(
            "/v1/patient/search/:identifier",
            get(patient::search_by_identifier),
        )
        .route("/v1/patient/:identifier", get(patient::get_patient))
        .route("/v1/patients", post(patient::create_patient))
}
