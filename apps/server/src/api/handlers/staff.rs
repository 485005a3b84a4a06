//! Staff account handlers
//!
//! - `POST /staff/create` - register an account in a hospital
//! - `POST /staff/login` - exchange credentials for a bearer token

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::extractors::JsonBody,
    auth::IssuedToken,
    models::Staff,
    services::NewStaff,
    state::AppState,
    Error, Result,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStaffRequest {
    #[validate(length(max = 64))]
    pub username: String,
    #[validate(length(max = 72))]
    pub password: String,
    #[validate(length(max = 64))]
    pub hospital_id: String,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub hospital_id: String,
}

#[derive(Debug, Serialize)]
pub struct StaffResponse {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub hospital_id: String,
    pub role: String,
}

impl From<Staff> for StaffResponse {
    fn from(staff: Staff) -> Self {
        Self {
            id: staff.id,
            username: staff.username,
            display_name: staff.display_name,
            hospital_id: staff.hospital_id,
            role: staff.role,
        }
    }
}

/// POST /staff/create
pub async fn create_staff(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateStaffRequest>,
) -> Result<(StatusCode, Json<StaffResponse>)> {
    request
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let staff = state
        .staff
        .register(NewStaff {
            username: request.username,
            password: request.password,
            hospital_id: request.hospital_id,
            display_name: request.display_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(staff.into())))
}

/// POST /staff/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<IssuedToken>> {
    let token = state
        .staff
        .login(&request.username, &request.password, &request.hospital_id)
        .await?;
    Ok(Json(token))
}
