//! Conflict resolution for writing a record under two alternate unique keys.
//!
//! A record is written under exactly one of three plans, chosen from its shape:
//! - national ID present: insert, or merge into the row holding that national ID
//! - else passport ID present: insert, or merge into the row holding that passport ID
//! - neither: plain insert
//!
//! Merging is last-write-wins for every field, except that the *other* identifier is
//! only overwritten when the incoming record carries one. `id` and `created_at` of the
//! existing row never change.

use chrono::{DateTime, Utc};

use crate::models::PatientRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPlan {
    ByNationalId,
    ByPassportId,
    PlainInsert,
}

impl UpsertPlan {
    /// Expects a normalized record (blank identifiers already `None`).
    pub fn for_record(record: &PatientRecord) -> Self {
        if record.national_id.is_some() {
            Self::ByNationalId
        } else if record.passport_id.is_some() {
            Self::ByPassportId
        } else {
            Self::PlainInsert
        }
    }

    /// Conflict target column on `patients` (always paired with `hospital_id`).
    pub fn conflict_column(self) -> Option<&'static str> {
        match self {
            Self::ByNationalId => Some("national_id"),
            Self::ByPassportId => Some("passport_id"),
            Self::PlainInsert => None,
        }
    }

    /// The identifier that is preserved unless the incoming record carries one.
    pub fn preserved_column(self) -> Option<&'static str> {
        match self {
            Self::ByNationalId => Some("passport_id"),
            Self::ByPassportId => Some("national_id"),
            Self::PlainInsert => None,
        }
    }

    /// True when `existing` is the row this plan collides with for `incoming`.
    pub fn collides(self, existing: &PatientRecord, incoming: &PatientRecord) -> bool {
        if existing.hospital_id != incoming.hospital_id {
            return false;
        }
        match self {
            Self::ByNationalId => {
                incoming.national_id.is_some() && existing.national_id == incoming.national_id
            }
            Self::ByPassportId => {
                incoming.passport_id.is_some() && existing.passport_id == incoming.passport_id
            }
            Self::PlainInsert => false,
        }
    }

    /// Apply the merge rule: the stored row after `incoming` collided with `existing`.
    pub fn merge(
        self,
        existing: &PatientRecord,
        incoming: PatientRecord,
        now: DateTime<Utc>,
    ) -> PatientRecord {
        let mut merged = PatientRecord {
            id: existing.id,
            created_at: existing.created_at,
            updated_at: Some(now),
            ..incoming
        };
        match self {
            Self::ByNationalId => {
                merged.passport_id = merged.passport_id.or_else(|| existing.passport_id.clone());
            }
            Self::ByPassportId => {
                merged.national_id = merged.national_id.or_else(|| existing.national_id.clone());
            }
            Self::PlainInsert => {}
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(national: Option<&str>, passport: Option<&str>) -> PatientRecord {
        PatientRecord {
            id: Some(Uuid::new_v4()),
            national_id: national.map(str::to_string),
            passport_id: passport.map(str::to_string),
            hospital_id: Some("H1".to_string()),
            ..PatientRecord::empty()
        }
    }

    #[test]
    fn plan_is_chosen_from_record_shape() {
        assert_eq!(
            UpsertPlan::for_record(&record(Some("N"), Some("P"))),
            UpsertPlan::ByNationalId
        );
        assert_eq!(
            UpsertPlan::for_record(&record(None, Some("P"))),
            UpsertPlan::ByPassportId
        );
        assert_eq!(
            UpsertPlan::for_record(&record(None, None)),
            UpsertPlan::PlainInsert
        );
    }

    #[test]
    fn national_merge_keeps_existing_passport_when_incoming_has_none() {
        let now = Utc::now();
        let mut existing = record(Some("N-1"), Some("P-1"));
        existing.created_at = Some(now - chrono::Duration::days(1));
        existing.first_name_en = Some("Old".into());

        let mut incoming = record(Some("N-1"), None);
        incoming.first_name_en = Some("New".into());

        let merged = UpsertPlan::ByNationalId.merge(&existing, incoming, now);
        assert_eq!(merged.id, existing.id);
        assert_eq!(merged.created_at, existing.created_at);
        assert_eq!(merged.updated_at, Some(now));
        assert_eq!(merged.passport_id.as_deref(), Some("P-1"));
        assert_eq!(merged.first_name_en.as_deref(), Some("New"));
    }

    #[test]
    fn national_merge_overwrites_passport_when_present() {
        let existing = record(Some("N-1"), Some("P-1"));
        let incoming = record(Some("N-1"), Some("P-2"));
        let merged = UpsertPlan::ByNationalId.merge(&existing, incoming, Utc::now());
        assert_eq!(merged.passport_id.as_deref(), Some("P-2"));
    }

    #[test]
    fn passport_merge_preserves_national_symmetrically() {
        let existing = record(Some("N-1"), Some("P-1"));
        let mut incoming = record(None, Some("P-1"));
        incoming.email = Some("a@example.com".into());

        let merged = UpsertPlan::ByPassportId.merge(&existing, incoming, Utc::now());
        assert_eq!(merged.national_id.as_deref(), Some("N-1"));
        assert_eq!(merged.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn demographics_are_last_write_wins_even_when_cleared() {
        let mut existing = record(Some("N-1"), None);
        existing.phone_number = Some("0811112222".into());
        let incoming = record(Some("N-1"), None);

        let merged = UpsertPlan::ByNationalId.merge(&existing, incoming, Utc::now());
        assert_eq!(merged.phone_number, None);
    }

    #[test]
    fn collision_is_scoped_to_hospital() {
        let existing = record(Some("N-1"), None);
        let mut incoming = record(Some("N-1"), None);
        assert!(UpsertPlan::ByNationalId.collides(&existing, &incoming));

        incoming.hospital_id = Some("H2".to_string());
        assert!(!UpsertPlan::ByNationalId.collides(&existing, &incoming));
    }
}
