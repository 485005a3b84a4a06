//! Local stand-in for the hospital API.
//!
//! Answers `GET /patient/search/:identifier` with a fixed demographic record whose
//! `national_id` echoes the identifier. A few identifier prefixes trigger the failure
//! modes the real source can exhibit:
//! - `UNKNOWN-` -> 404
//! - `FAIL-` -> 503
//! - `SLOW-` -> answers after [`SLOW_RESPONSE_DELAY`]

use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::time::Duration;

pub const SLOW_RESPONSE_DELAY: Duration = Duration::from_secs(3);

pub fn router() -> Router {
    Router::new().route("/patient/search/:identifier", get(search_patient))
}

async fn search_patient(Path(identifier): Path<String>) -> Response {
    if identifier.starts_with("UNKNOWN-") {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response();
    }
    if identifier.starts_with("FAIL-") {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable").into_response();
    }
    if identifier.starts_with("SLOW-") {
        tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
    }

    tracing::debug!(identifier = %identifier, "Mock hospital lookup");

    Json(json!({
        "first_name_th": "มานพ",
        "middle_name_th": "",
        "last_name_th": "สุขใจ",
        "first_name_en": "Manop",
        "middle_name_en": "",
        "last_name_en": "Sukjai",
        "date_of_birth": "1985-05-05",
        "patient_hn": "HN-999",
        "national_id": identifier,
        "passport_id": "",
        "phone_number": "0811112222",
        "email": "manop@example.com",
        "gender": "M"
    }))
    .into_response()
}
