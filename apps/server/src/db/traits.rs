//! Storage trait for patient records

use crate::{
    models::{PatientFilter, PatientRecord, SearchPage, Staff},
    Result,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Durable keyed storage for patient records.
///
/// Absence is `Ok(None)`, never an error. Every other failure is a storage error
/// (`Error::Database` or `Error::Conflict`) and is surfaced unchanged.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Read a record by internal id
    async fn get_by_id(&self, id: Uuid) -> Result<Option<PatientRecord>>;

    /// Find a record whose national ID *or* passport ID equals `identifier`
    ///
    /// Not scoped to a hospital. When several rows match, a national ID match wins over a
    /// passport ID match and the earliest-created row wins among equals.
    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<PatientRecord>>;

    /// Plain insert
    ///
    /// Assigns an internal id when the record has none.
    ///
    /// # Errors
    /// * `Conflict` - If either identifier is already held within the hospital scope
    async fn create(&self, record: PatientRecord) -> Result<PatientRecord>;

    /// Insert or merge-update keyed on national ID, else passport ID, else plain insert
    ///
    /// See [`crate::db::UpsertPlan`] for the merge rule. Returns the persisted row, whose
    /// internal id is the stored one when the update branch was taken.
    ///
    /// # Errors
    /// * `Conflict` - If the write collides on the identifier the plan does not key on
    async fn upsert(&self, record: PatientRecord) -> Result<PatientRecord>;

    /// Search one hospital scope
    ///
    /// # Arguments
    /// * `hospital_id` - Scope; always part of the predicate
    /// * `filter` - AND-ed criteria; an empty filter matches the whole scope
    /// * `limit`/`offset` - Passed through unchanged; negative values are rejected
    ///
    /// # Returns
    /// The page (newest first) and the total match count ignoring paging
    async fn search(
        &self,
        hospital_id: &str,
        filter: &PatientFilter,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage>;
}

/// Staff account storage, keyed by `(username, hospital_id)`.
#[async_trait]
pub trait StaffStore: Send + Sync {
    /// Insert a new account
    ///
    /// # Errors
    /// * `Conflict` - If the username is already taken within the hospital
    async fn create(&self, staff: Staff) -> Result<Staff>;

    async fn get_by_username(&self, username: &str, hospital_id: &str) -> Result<Option<Staff>>;
}

pub(crate) fn check_paging(limit: i64, offset: i64) -> Result<()> {
    if limit < 0 || offset < 0 {
        return Err(crate::Error::Validation(format!(
            "limit and offset must not be negative (limit={limit}, offset={offset})"
        )));
    }
    Ok(())
}
