//! Error types for the patient lookup service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::adapter::AdapterError;

pub type Result<T> = std::result::Result<T, Error>;

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Conflicting patient record: {0}")]
    Conflict(String),

    #[error("Hospital source error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let detail = db_err
                    .constraint()
                    .map(|c| format!("unique constraint {c} violated"))
                    .unwrap_or_else(|| db_err.message().to_string());
                return Error::Conflict(detail);
            }
        }
        Error::Database(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
            Error::AlreadyExists(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid credentials".to_string())
            }
            Error::Conflict(_) => {
                tracing::warn!(error = %self, "Patient upsert conflict");
                (StatusCode::CONFLICT, "duplicate_patient".to_string())
            }
            Error::Database(_) | Error::Adapter(_) | Error::Internal(_) | Error::Other(_) => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}
