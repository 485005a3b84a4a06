//! SQL builder for hospital-scoped patient searches.
//!
//! Every set filter field adds one AND-ed clause; the hospital clause is always first.
//! Blank filter fields are dropped before any clause is built.
//! Name filters match either script variant. Substring filters use `ILIKE` with LIKE
//! meta-characters in user input escaped.

use chrono::NaiveDate;

use crate::models::PatientFilter;

/// Column list shared by every `SELECT`/`RETURNING` on `patients`.
pub(crate) const PATIENT_COLUMNS: &str = "id, patient_hn, national_id, passport_id, \
     first_name_th, middle_name_th, last_name_th, \
     first_name_en, middle_name_en, last_name_en, \
     date_of_birth, phone_number, email, gender, raw_payload, hospital_id, \
     created_at, updated_at";

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Date(NaiveDate),
    BigInt(i64),
}

/// Search predicate over `patients` for one hospital scope.
#[derive(Debug, Clone)]
pub struct PatientQuery<'a> {
    hospital_id: &'a str,
    filter: PatientFilter,
}

impl<'a> PatientQuery<'a> {
    pub fn new(hospital_id: &'a str, filter: &PatientFilter) -> Self {
        Self {
            hospital_id,
            filter: filter.clone().normalized(),
        }
    }

    /// `WHERE` clause (without the keyword) and its bind values.
    pub fn build_where(&self) -> (String, Vec<BindValue>) {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();

        let idx = push(&mut binds, BindValue::Text(self.hospital_id.to_string()));
        clauses.push(format!("hospital_id = ${idx}"));

        let f = &self.filter;
        if let Some(v) = &f.national_id {
            let idx = push(&mut binds, BindValue::Text(v.clone()));
            clauses.push(format!("national_id = ${idx}"));
        }
        if let Some(v) = &f.passport_id {
            let idx = push(&mut binds, BindValue::Text(v.clone()));
            clauses.push(format!("passport_id = ${idx}"));
        }
        if let Some(v) = &f.patient_hn {
            let idx = push(&mut binds, BindValue::Text(v.clone()));
            clauses.push(format!("patient_hn = ${idx}"));
        }
        if let Some(v) = &f.first_name {
            clauses.push(either_script_clause(&mut binds, "first_name", v));
        }
        if let Some(v) = &f.middle_name {
            clauses.push(either_script_clause(&mut binds, "middle_name", v));
        }
        if let Some(v) = &f.last_name {
            clauses.push(either_script_clause(&mut binds, "last_name", v));
        }
        if let Some(v) = f.date_of_birth {
            let idx = push(&mut binds, BindValue::Date(v));
            clauses.push(format!("date_of_birth = ${idx}"));
        }
        if let Some(v) = &f.phone_number {
            clauses.push(contains_clause(&mut binds, "phone_number", v));
        }
        if let Some(v) = &f.email {
            clauses.push(contains_clause(&mut binds, "email", v));
        }

        (clauses.join(" AND "), binds)
    }

    pub fn build_count_sql(&self) -> (String, Vec<BindValue>) {
        let (where_clause, binds) = self.build_where();
        (
            format!("SELECT COUNT(*) FROM patients WHERE {where_clause}"),
            binds,
        )
    }

    /// Page query, newest first. `limit`/`offset` are passed through unchanged.
    pub fn build_select_sql(&self, limit: i64, offset: i64) -> (String, Vec<BindValue>) {
        let (where_clause, mut binds) = self.build_where();
        let limit_idx = push(&mut binds, BindValue::BigInt(limit));
        let offset_idx = push(&mut binds, BindValue::BigInt(offset));
        (
            format!(
                "SELECT {PATIENT_COLUMNS} FROM patients WHERE {where_clause} \
                 ORDER BY created_at DESC, id DESC LIMIT ${limit_idx} OFFSET ${offset_idx}"
            ),
            binds,
        )
    }
}

fn push(binds: &mut Vec<BindValue>, value: BindValue) -> usize {
    binds.push(value);
    binds.len()
}

fn contains_clause(binds: &mut Vec<BindValue>, column: &str, value: &str) -> String {
    let idx = push(binds, BindValue::Text(contains_pattern(value)));
    format!("{column} ILIKE ${idx} ESCAPE '\\'")
}

/// One bind shared by the Latin-script and local-script columns.
fn either_script_clause(binds: &mut Vec<BindValue>, stem: &str, value: &str) -> String {
    let idx = push(binds, BindValue::Text(contains_pattern(value)));
    format!("({stem}_en ILIKE ${idx} ESCAPE '\\' OR {stem}_th ILIKE ${idx} ESCAPE '\\')")
}

fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like_pattern(value))
}

pub(crate) fn escape_like_pattern(s: &str) -> String {
    // Escape SQL LIKE meta-characters so user input is treated literally.
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
