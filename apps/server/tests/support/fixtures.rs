use chrono::NaiveDate;
use patient_lookup::models::PatientRecord;
use uuid::Uuid;

/// A persisted-shape record owned by `hospital_id`.
pub fn patient(hospital_id: &str, national_id: Option<&str>, passport_id: Option<&str>) -> PatientRecord {
    PatientRecord {
        id: Some(Uuid::new_v4()),
        patient_hn: Some("HN-001".to_string()),
        national_id: national_id.map(str::to_string),
        passport_id: passport_id.map(str::to_string),
        first_name_th: Some("สมชาย".to_string()),
        last_name_th: Some("ใจดี".to_string()),
        first_name_en: Some("Somchai".to_string()),
        last_name_en: Some("Jaidee".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 5),
        phone_number: Some("0812345678".to_string()),
        email: Some("somchai@example.com".to_string()),
        gender: Some("M".to_string()),
        hospital_id: Some(hospital_id.to_string()),
        ..PatientRecord::empty()
    }
}

pub fn named(mut record: PatientRecord, first_en: &str, last_en: &str) -> PatientRecord {
    record.first_name_en = Some(first_en.to_string());
    record.last_name_en = Some(last_en.to_string());
    record
}

/// What the hospital source returns: no id, no hospital scope.
pub fn upstream_patient(national_id: &str) -> PatientRecord {
    PatientRecord {
        patient_hn: Some("HN-999".to_string()),
        national_id: Some(national_id.to_string()),
        first_name_en: Some("Manop".to_string()),
        last_name_en: Some("Sukjai".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 31),
        gender: Some("M".to_string()),
        raw_payload: Some(br#"{"national_id":"upstream"}"#.to_vec()),
        ..PatientRecord::empty()
    }
}
