//! HTTP client for the external hospital API.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use url::Url;

use super::{AdapterError, HospitalSource};
use crate::config::HospitalConfig;
use crate::models::PatientRecord;

/// Upper bound on how much of an error body is kept for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Calls `GET {base_url}/patient/search/{identifier}` on the hospital API.
#[derive(Clone)]
pub struct HospitalHttpClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HospitalHttpClient {
    pub fn new(config: &HospitalConfig) -> Result<Self, AdapterError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AdapterError::Misconfigured(format!("invalid base url '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AdapterError::Misconfigured(format!(
                "base url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::Misconfigured(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    fn lookup_url(&self, identifier: &str) -> Url {
        let mut url = self.base_url.clone();
        // Segments are percent-encoded by `extend`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["patient", "search", identifier]);
        }
        url
    }
}

#[async_trait]
impl HospitalSource for HospitalHttpClient {
    #[tracing::instrument(name = "hospital_lookup", skip(self), fields(status = tracing::field::Empty))]
    async fn lookup(&self, identifier: &str) -> Result<Option<PatientRecord>, AdapterError> {
        let url = self.lookup_url(identifier);
        let start = Instant::now();

        let result = self.fetch(url).await;

        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "not_found",
            Err(AdapterError::Timeout) => "timeout",
            Err(_) => "error",
        };
        crate::metrics::HOSPITAL_LOOKUP_DURATION_SECONDS
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }
}

impl HospitalHttpClient {
    async fn fetch(&self, url: Url) -> Result<Option<PatientRecord>, AdapterError> {
        let response = self.http.get(url).send().await.map_err(map_transport)?;
        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.bytes().await.map_err(map_transport)?;

        if !status.is_success() {
            let end = body.len().min(MAX_ERROR_BODY_BYTES);
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body[..end]).into_owned(),
            });
        }

        let payload: HospitalPayload =
            serde_json::from_slice(&body).map_err(|e| AdapterError::Decode(e.to_string()))?;

        Ok(Some(payload.into_record(body.to_vec())))
    }
}

fn map_transport(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::Transport(err.to_string())
    }
}

/// Response body of the hospital API (fields the service keeps).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HospitalPayload {
    first_name_th: Option<String>,
    middle_name_th: Option<String>,
    last_name_th: Option<String>,
    first_name_en: Option<String>,
    middle_name_en: Option<String>,
    last_name_en: Option<String>,
    date_of_birth: Option<String>,
    patient_hn: Option<String>,
    national_id: Option<String>,
    passport_id: Option<String>,
    phone_number: Option<String>,
    email: Option<String>,
    gender: Option<String>,
}

impl HospitalPayload {
    pub(crate) fn into_record(self, raw: Vec<u8>) -> PatientRecord {
        let date_of_birth = self
            .date_of_birth
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(e) => {
                    tracing::warn!(value = s, error = %e, "Ignoring unparseable date_of_birth from hospital source");
                    None
                }
            });

        PatientRecord {
            patient_hn: self.patient_hn,
            national_id: self.national_id,
            passport_id: self.passport_id,
            first_name_th: self.first_name_th,
            middle_name_th: self.middle_name_th,
            last_name_th: self.last_name_th,
            first_name_en: self.first_name_en,
            middle_name_en: self.middle_name_en,
            last_name_en: self.last_name_en,
            date_of_birth,
            phone_number: self.phone_number,
            email: self.email,
            gender: self.gender,
            raw_payload: Some(raw),
            ..PatientRecord::empty()
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HospitalHttpClient {
        HospitalHttpClient::new(&HospitalConfig {
            base_url: base.to_string(),
            timeout_ms: 500,
        })
        .unwrap()
    }

    #[test]
    fn lookup_url_appends_encoded_identifier() {
        let c = client("http://hospital-a.example/api/");
        assert_eq!(
            c.lookup_url("AB 12/3").as_str(),
            "http://hospital-a.example/api/patient/search/AB%2012%2F3"
        );

        let c = client("http://hospital-a.example");
        assert_eq!(
            c.lookup_url("1234").as_str(),
            "http://hospital-a.example/patient/search/1234"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = HospitalHttpClient::new(&HospitalConfig {
            base_url: "not a url".to_string(),
            timeout_ms: 500,
        });
        assert!(matches!(result, Err(AdapterError::Misconfigured(_))));
    }

    #[test]
    fn payload_maps_to_normalized_record() {
        let body = br#"{"national_id":"N-1","passport_id":"","first_name_en":"Ann","date_of_birth":"1985-05-05","gender":"F"}"#;
        let payload: HospitalPayload = serde_json::from_slice(body).unwrap();
        let record = payload.into_record(body.to_vec());

        assert_eq!(record.national_id.as_deref(), Some("N-1"));
        assert_eq!(record.passport_id, None);
        assert_eq!(record.first_name_en.as_deref(), Some("Ann"));
        assert_eq!(
            record.date_of_birth,
            NaiveDate::from_ymd_opt(1985, 5, 5)
        );
        assert_eq!(record.raw_payload.as_deref(), Some(&body[..]));
        assert_eq!(record.id, None);
        assert_eq!(record.hospital_id, None);
    }

    #[test]
    fn unparseable_birth_date_is_dropped() {
        let payload: HospitalPayload =
            serde_json::from_str(r#"{"national_id":"N-1","date_of_birth":"05/05/1985"}"#).unwrap();
        let record = payload.into_record(Vec::new());
        assert_eq!(record.date_of_birth, None);
        assert_eq!(record.national_id.as_deref(), Some("N-1"));
    }
}
