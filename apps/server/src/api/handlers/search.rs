//! Filter search handlers
//!
//! - `POST /patient/search` - legacy endpoint, default page size 10, no upper bound
//! - `POST /v1/patient/search` - default page size 20, capped by `search.max_limit`
//!
//! Both are scoped to the caller's hospital and attributed to the caller for auditing.

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    api::extractors::JsonBody,
    auth::AuthenticatedPrincipal,
    config::SearchConfig,
    models::{patient::non_blank, PatientFilter, PatientRecord},
    services::{Paging, SearchScope},
    state::AppState,
    Error, Result,
};

/// Search body shared by both endpoints.
///
/// `first_name`/`last_name`/`middle_name` win over their `_en` spellings when both are
/// sent; either spelling matches both scripts.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub national_id: Option<String>,
    pub passport_id: Option<String>,
    pub patient_hn: Option<String>,
    pub first_name: Option<String>,
    pub first_name_en: Option<String>,
    pub middle_name: Option<String>,
    pub middle_name_en: Option<String>,
    pub last_name: Option<String>,
    pub last_name_en: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SearchRequest {
    pub fn filter(&self) -> Result<PatientFilter> {
        let name = |primary: &Option<String>, alternate: &Option<String>| {
            non_blank(primary.clone()).or_else(|| non_blank(alternate.clone()))
        };

        Ok(PatientFilter {
            national_id: self.national_id.clone(),
            passport_id: self.passport_id.clone(),
            patient_hn: self.patient_hn.clone(),
            first_name: name(&self.first_name, &self.first_name_en),
            middle_name: name(&self.middle_name, &self.middle_name_en),
            last_name: name(&self.last_name, &self.last_name_en),
            date_of_birth: parse_date(self.date_of_birth.as_deref())?,
            phone_number: self.phone_number.clone(),
            email: self.email.clone(),
        }
        .normalized())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Matches ignoring paging.
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<PatientRecord>,
}

/// Parse an optional `YYYY-MM-DD` date; blank means unset.
pub(crate) fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| Error::Validation(format!("date_of_birth '{v}' is not YYYY-MM-DD"))),
    }
}

fn legacy_paging(config: &SearchConfig, limit: Option<i64>, offset: Option<i64>) -> Paging {
    Paging {
        limit: limit
            .filter(|l| *l > 0)
            .unwrap_or(config.legacy_default_limit),
        offset: offset.unwrap_or(0).max(0),
    }
}

fn scoped_paging(config: &SearchConfig, limit: Option<i64>, offset: Option<i64>) -> Paging {
    Paging {
        limit: limit
            .filter(|l| *l > 0)
            .map(|l| l.min(config.max_limit))
            .unwrap_or(config.default_limit),
        offset: offset.unwrap_or(0).max(0),
    }
}

/// POST /patient/search
pub async fn legacy_search(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    JsonBody(request): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let paging = legacy_paging(&state.config.search, request.limit, request.offset);
    run_search(&state, &principal, &request, paging).await
}

/// POST /v1/patient/search
pub async fn scoped_search(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    JsonBody(request): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let paging = scoped_paging(&state.config.search, request.limit, request.offset);
    run_search(&state, &principal, &request, paging).await
}

async fn run_search(
    state: &AppState,
    principal: &crate::auth::Principal,
    request: &SearchRequest,
    paging: Paging,
) -> Result<Json<SearchResponse>> {
    let filter = request.filter()?;
    let scope = SearchScope {
        hospital_id: &principal.hospital_id,
        staff_id: Some(principal.staff_id.as_str()),
    };

    let page = state.search.search(scope, filter, paging).await?;

    Ok(Json(SearchResponse {
        count: page.total,
        limit: paging.limit,
        offset: paging.offset,
        results: page.results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_defaults_to_ten_and_does_not_cap() {
        let config = SearchConfig::default();
        assert_eq!(legacy_paging(&config, None, None).limit, 10);
        assert_eq!(legacy_paging(&config, Some(0), None).limit, 10);
        assert_eq!(legacy_paging(&config, Some(-3), None).limit, 10);
        assert_eq!(legacy_paging(&config, Some(500), None).limit, 500);
    }

    #[test]
    fn scoped_defaults_to_twenty_and_caps_at_max() {
        let config = SearchConfig::default();
        assert_eq!(scoped_paging(&config, None, None).limit, 20);
        assert_eq!(scoped_paging(&config, Some(-1), None).limit, 20);
        assert_eq!(scoped_paging(&config, Some(50), None).limit, 50);
        assert_eq!(scoped_paging(&config, Some(1000), None).limit, 100);
    }

    #[test]
    fn negative_offset_is_clamped_to_zero() {
        let config = SearchConfig::default();
        assert_eq!(legacy_paging(&config, None, Some(-5)).offset, 0);
        assert_eq!(scoped_paging(&config, None, Some(-5)).offset, 0);
        assert_eq!(scoped_paging(&config, None, Some(7)).offset, 7);
    }

    #[test]
    fn generic_name_wins_over_latin_spelling() {
        let request = SearchRequest {
            first_name: Some("Somchai".into()),
            first_name_en: Some("Other".into()),
            last_name_en: Some("Jaidee".into()),
            ..SearchRequest::default()
        };
        let filter = request.filter().unwrap();
        assert_eq!(filter.first_name.as_deref(), Some("Somchai"));
        assert_eq!(filter.last_name.as_deref(), Some("Jaidee"));
    }

    #[test]
    fn blank_generic_name_falls_back_to_latin_spelling() {
        let request = SearchRequest {
            first_name: Some(" ".into()),
            first_name_en: Some("Manop".into()),
            ..SearchRequest::default()
        };
        assert_eq!(request.filter().unwrap().first_name.as_deref(), Some("Manop"));
    }

    #[test]
    fn date_of_birth_must_be_iso() {
        assert_eq!(parse_date(Some("")).unwrap(), None);
        assert_eq!(
            parse_date(Some("1985-05-05")).unwrap(),
            NaiveDate::from_ymd_opt(1985, 5, 5)
        );
        assert!(matches!(
            parse_date(Some("05/05/1985")),
            Err(Error::Validation(_))
        ));
    }
}
