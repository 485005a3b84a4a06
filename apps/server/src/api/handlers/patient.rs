//! Patient handlers
//!
//! - `GET /v1/patient/:identifier` - resolve through the local store and hospital source
//! - `GET /v1/patient/search/:identifier` - local search, national ID then passport
//! - `POST /v1/patients` - create or merge a record in the caller's hospital

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::search::parse_date;
use crate::{
    api::extractors::JsonBody,
    auth::AuthenticatedPrincipal,
    models::{patient::non_blank, PatientRecord},
    services::{Paging, SearchScope},
    state::AppState,
    Error, Result,
};

/// GET /v1/patient/:identifier
///
/// A record owned by another hospital is reported as not found. Records without a
/// hospital are visible to every caller.
pub async fn get_patient(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(identifier): Path<String>,
) -> Result<Json<PatientRecord>> {
    let record = state
        .resolver
        .resolve(&identifier, Some(principal.hospital_id.as_str()))
        .await?
        .ok_or_else(|| Error::NotFound(format!("patient {identifier}")))?;

    if let Some(owner) = record.hospital_id.as_deref() {
        if owner != principal.hospital_id {
            tracing::debug!(
                patient_id = ?record.id,
                owner,
                "Hiding patient owned by another hospital"
            );
            return Err(Error::NotFound(format!("patient {identifier}")));
        }
    }

    Ok(Json(record))
}

/// GET /v1/patient/search/:identifier
pub async fn search_by_identifier(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(identifier): Path<String>,
) -> Result<Json<PatientRecord>> {
    let scope = SearchScope {
        hospital_id: &principal.hospital_id,
        staff_id: Some(principal.staff_id.as_str()),
    };
    let page = state
        .search
        .search_by_identifier(scope, &identifier, Paging { limit: 1, offset: 0 })
        .await?;

    page.results
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("patient {identifier}")))
}

/// Body of `POST /v1/patients`.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreatePatientRequest {
    #[validate(length(max = 64))]
    pub patient_hn: Option<String>,
    #[validate(length(max = 64))]
    pub national_id: Option<String>,
    #[validate(length(max = 64))]
    pub passport_id: Option<String>,
    pub first_name_th: Option<String>,
    pub middle_name_th: Option<String>,
    pub last_name_th: Option<String>,
    pub first_name_en: Option<String>,
    pub middle_name_en: Option<String>,
    pub last_name_en: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    #[validate(length(max = 32))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 16))]
    pub gender: Option<String>,
}

impl CreatePatientRequest {
    /// Validate and convert into a record owned by `hospital_id` with a fresh id.
    pub fn into_record(self, hospital_id: &str) -> Result<PatientRecord> {
        let request = Self {
            email: non_blank(self.email),
            ..self
        };
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        let date_of_birth = parse_date(request.date_of_birth.as_deref())?;
        let record = PatientRecord {
            id: Some(Uuid::new_v4()),
            patient_hn: request.patient_hn,
            national_id: request.national_id,
            passport_id: request.passport_id,
            first_name_th: request.first_name_th,
            middle_name_th: request.middle_name_th,
            last_name_th: request.last_name_th,
            first_name_en: request.first_name_en,
            middle_name_en: request.middle_name_en,
            last_name_en: request.last_name_en,
            date_of_birth,
            phone_number: request.phone_number,
            email: request.email,
            gender: request.gender,
            hospital_id: Some(hospital_id.to_string()),
            ..PatientRecord::empty()
        }
        .normalized();

        if !record.has_identifier() {
            return Err(Error::Validation(
                "national_id or passport_id is required".to_string(),
            ));
        }
        Ok(record)
    }
}

/// POST /v1/patients
///
/// Merges into an existing record of the same hospital that shares the national ID (or,
/// without one, the passport number).
pub async fn create_patient(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    JsonBody(request): JsonBody<CreatePatientRequest>,
) -> Result<(StatusCode, Json<PatientRecord>)> {
    let record = request.into_record(&principal.hospital_id)?;
    let stored = state.store.upsert(record).await?;

    tracing::info!(
        patient_id = ?stored.id,
        hospital_id = %principal.hospital_id,
        staff_id = %principal.staff_id,
        "Patient stored"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}
