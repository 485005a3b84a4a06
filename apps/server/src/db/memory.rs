//! In-memory patient and staff stores.
//!
//! Same contracts and merge rule as the PostgreSQL stores. Used by tests and by the server
//! when no database is configured. All writes happen under one write lock, which makes
//! every upsert atomic. Creation timestamps are strictly increasing within one store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::check_paging;
use super::{PatientStore, StaffStore, UpsertPlan};
use crate::{
    models::{PatientFilter, PatientRecord, SearchPage, Staff},
    Error, Result,
};

#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    rows: RwLock<Vec<PatientRecord>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Snapshot of every stored row in insertion order.
    pub async fn all(&self) -> Vec<PatientRecord> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<PatientRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<PatientRecord>> {
        let rows = self.rows.read().await;
        let best = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches_identifier(identifier))
            .min_by_key(|(idx, r)| {
                let national_match = r.national_id.as_deref() == Some(identifier);
                (!national_match, r.created_at, *idx)
            })
            .map(|(_, r)| r.clone());
        Ok(best)
    }

    async fn create(&self, record: PatientRecord) -> Result<PatientRecord> {
        let mut record = record.normalized();
        record.id.get_or_insert_with(Uuid::new_v4);

        let mut rows = self.rows.write().await;
        let now = next_timestamp(&rows);
        record.created_at = Some(now);
        record.updated_at = Some(now);
        ensure_unique(&rows, &record, None)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn upsert(&self, record: PatientRecord) -> Result<PatientRecord> {
        let mut record = record.normalized();
        let plan = UpsertPlan::for_record(&record);
        if plan == UpsertPlan::PlainInsert {
            return self.create(record).await;
        }

        record.id.get_or_insert_with(Uuid::new_v4);

        let mut rows = self.rows.write().await;
        let now = next_timestamp(&rows);
        match rows.iter().position(|r| plan.collides(r, &record)) {
            Some(idx) => {
                let merged = plan.merge(&rows[idx], record, now);
                ensure_unique(&rows, &merged, Some(idx))?;
                rows[idx] = merged.clone();
                Ok(merged)
            }
            None => {
                record.created_at = Some(now);
                record.updated_at = Some(now);
                ensure_unique(&rows, &record, None)?;
                rows.push(record.clone());
                Ok(record)
            }
        }
    }

    async fn search(
        &self,
        hospital_id: &str,
        filter: &PatientFilter,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage> {
        check_paging(limit, offset)?;
        let filter = filter.clone().normalized();

        let rows = self.rows.read().await;
        let mut matches: Vec<&PatientRecord> = rows
            .iter()
            .filter(|r| r.hospital_id.as_deref().unwrap_or("") == hospital_id)
            .filter(|r| matches_filter(&filter, r))
            .collect();
        // Same order as `ORDER BY created_at DESC, id DESC`.
        matches.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matches.len() as i64;
        let results = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(SearchPage { results, total })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStaffStore {
    accounts: RwLock<Vec<Staff>>,
}

impl InMemoryStaffStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StaffStore for InMemoryStaffStore {
    async fn create(&self, mut staff: Staff) -> Result<Staff> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .iter()
            .any(|s| s.username == staff.username && s.hospital_id == staff.hospital_id)
        {
            return Err(Error::Conflict(
                "unique constraint staffs_username_hospital_key violated".to_string(),
            ));
        }
        let now = Utc::now();
        staff.created_at = Some(now);
        staff.updated_at = Some(now);
        accounts.push(staff.clone());
        Ok(staff)
    }

    async fn get_by_username(&self, username: &str, hospital_id: &str) -> Result<Option<Staff>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|s| s.username == username && s.hospital_id == hospital_id)
            .cloned())
    }
}

/// Wall-clock time, bumped past the newest stored row when the clock has not advanced.
fn next_timestamp(rows: &[PatientRecord]) -> DateTime<Utc> {
    let now = Utc::now();
    match rows.iter().filter_map(|r| r.created_at).max() {
        Some(latest) if latest >= now => latest + Duration::microseconds(1),
        _ => now,
    }
}

/// Reject `candidate` if another row (other than `skip`) already holds its id or either
/// identifier within the same hospital.
fn ensure_unique(
    rows: &[PatientRecord],
    candidate: &PatientRecord,
    skip: Option<usize>,
) -> Result<()> {
    for (idx, row) in rows.iter().enumerate() {
        if Some(idx) == skip {
            continue;
        }
        if row.id.is_some() && row.id == candidate.id {
            return Err(Error::Conflict("patients_pkey".to_string()));
        }
        if row.hospital_id != candidate.hospital_id {
            continue;
        }
        if candidate.national_id.is_some() && row.national_id == candidate.national_id {
            return Err(Error::Conflict(
                "patients_hospital_national_id_key".to_string(),
            ));
        }
        if candidate.passport_id.is_some() && row.passport_id == candidate.passport_id {
            return Err(Error::Conflict(
                "patients_hospital_passport_id_key".to_string(),
            ));
        }
    }
    Ok(())
}

fn matches_filter(filter: &PatientFilter, record: &PatientRecord) -> bool {
    let exact = |wanted: &Option<String>, actual: &Option<String>| match wanted {
        Some(w) => actual.as_deref() == Some(w.as_str()),
        None => true,
    };
    let contains = |wanted: &Option<String>, actual: &Option<String>| match wanted {
        Some(w) => actual
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(&w.to_lowercase())),
        None => true,
    };
    let either = |wanted: &Option<String>, latin: &Option<String>, local: &Option<String>| {
        wanted.is_none() || contains(wanted, latin) || contains(wanted, local)
    };

    exact(&filter.national_id, &record.national_id)
        && exact(&filter.passport_id, &record.passport_id)
        && exact(&filter.patient_hn, &record.patient_hn)
        && either(
            &filter.first_name,
            &record.first_name_en,
            &record.first_name_th,
        )
        && either(
            &filter.middle_name,
            &record.middle_name_en,
            &record.middle_name_th,
        )
        && either(&filter.last_name, &record.last_name_en, &record.last_name_th)
        && filter
            .date_of_birth
            .map_or(true, |d| record.date_of_birth == Some(d))
        && contains(&filter.phone_number, &record.phone_number)
        && contains(&filter.email, &record.email)
}
