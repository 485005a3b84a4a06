//! Patient demographic record and search filter types.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Canonical patient entity, owned by exactly one hospital scope once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Internal identifier, assigned once and never changed.
    pub id: Option<Uuid>,
    /// Hospital number as reported by the external source.
    pub patient_hn: Option<String>,
    pub national_id: Option<String>,
    pub passport_id: Option<String>,

    /// Local-script (Thai) name triplet.
    pub first_name_th: Option<String>,
    pub middle_name_th: Option<String>,
    pub last_name_th: Option<String>,

    /// Latin-script name triplet.
    pub first_name_en: Option<String>,
    pub middle_name_en: Option<String>,
    pub last_name_en: Option<String>,

    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    /// Gender code as reported upstream (`M`, `F`, ...).
    pub gender: Option<String>,

    /// Original external-source response body. Kept for audit, never parsed.
    #[serde(
        default,
        serialize_with = "serialize_raw_payload",
        deserialize_with = "deserialize_raw_payload"
    )]
    pub raw_payload: Option<Vec<u8>>,

    pub hospital_id: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// An empty record with no identity, demographics or scope.
    pub fn empty() -> Self {
        Self {
            id: None,
            patient_hn: None,
            national_id: None,
            passport_id: None,
            first_name_th: None,
            middle_name_th: None,
            last_name_th: None,
            first_name_en: None,
            middle_name_en: None,
            last_name_en: None,
            date_of_birth: None,
            phone_number: None,
            email: None,
            gender: None,
            raw_payload: None,
            hospital_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Trim every text field and turn blank values into `None`.
    ///
    /// Stores rely on this so that "no identifier" is always `None` and never `""`.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.patient_hn,
            &mut self.national_id,
            &mut self.passport_id,
            &mut self.first_name_th,
            &mut self.middle_name_th,
            &mut self.last_name_th,
            &mut self.first_name_en,
            &mut self.middle_name_en,
            &mut self.last_name_en,
            &mut self.phone_number,
            &mut self.email,
            &mut self.gender,
            &mut self.hospital_id,
        ] {
            *field = non_blank(field.take());
        }
        self
    }

    pub fn has_identifier(&self) -> bool {
        self.national_id.is_some() || self.passport_id.is_some()
    }

    /// True when `identifier` equals either external identifier.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.national_id.as_deref() == Some(identifier)
            || self.passport_id.as_deref() == Some(identifier)
    }
}

/// Sparse set of match criteria. Unset (or blank) fields do not constrain the search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_hn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl PatientFilter {
    pub fn by_national_id(identifier: impl Into<String>) -> Self {
        Self {
            national_id: Some(identifier.into()),
            ..Self::default()
        }
    }

    pub fn by_passport_id(identifier: impl Into<String>) -> Self {
        Self {
            passport_id: Some(identifier.into()),
            ..Self::default()
        }
    }

    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.national_id,
            &mut self.passport_id,
            &mut self.patient_hn,
            &mut self.first_name,
            &mut self.middle_name,
            &mut self.last_name,
            &mut self.phone_number,
            &mut self.email,
        ] {
            *field = non_blank(field.take());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One page of search matches plus the unpaged match count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    /// Most recently created first.
    pub results: Vec<PatientRecord>,
    pub total: i64,
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn serialize_raw_payload<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_raw_payload<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
        .transpose()
}
