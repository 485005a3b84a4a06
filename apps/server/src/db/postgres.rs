//! PostgreSQL patient and staff stores.
//!
//! Every upsert is one `INSERT ... ON CONFLICT ... DO UPDATE ... RETURNING` statement, so
//! concurrent writers for the same identity converge on one row without an application
//! lock. An unscoped record is stored with `hospital_id = ''` and read back as `None`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
    PgPool, Postgres, Row,
};
use uuid::Uuid;

use super::query_builder::{BindValue, PatientQuery, PATIENT_COLUMNS};
use super::traits::check_paging;
use super::{PatientStore, StaffStore, UpsertPlan};
use crate::{
    config::DatabaseConfig,
    models::{PatientFilter, PatientRecord, SearchPage, Staff},
    Result,
};

/// Open the connection pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("database.url is not set"))?;

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .connect(url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PostgresPatientStore {
    pool: PgPool,
}

impl PostgresPatientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PatientStore for PostgresPatientStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<PatientRecord>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<PatientRecord>> {
        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients \
             WHERE national_id = $1 OR passport_id = $1 \
             ORDER BY CASE WHEN national_id = $1 THEN 0 ELSE 1 END, created_at ASC, id ASC \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(&self, record: PatientRecord) -> Result<PatientRecord> {
        let record = record.normalized();
        let sql = insert_sql(None);
        let row = bind_record(sqlx::query(&sql), &record)
            .fetch_one(&self.pool)
            .await?;
        row_to_record(&row)
    }

    async fn upsert(&self, record: PatientRecord) -> Result<PatientRecord> {
        let record = record.normalized();
        let plan = UpsertPlan::for_record(&record);
        let sql = insert_sql(Some(plan));

        let row = bind_record(sqlx::query(&sql), &record)
            .fetch_one(&self.pool)
            .await?;
        let stored = row_to_record(&row)?;

        tracing::debug!(
            patient_id = ?stored.id,
            hospital_id = stored.hospital_id.as_deref().unwrap_or(""),
            plan = ?plan,
            "Upserted patient"
        );
        Ok(stored)
    }

    async fn search(
        &self,
        hospital_id: &str,
        filter: &PatientFilter,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage> {
        check_paging(limit, offset)?;

        let query = PatientQuery::new(hospital_id, filter);

        let (count_sql, count_binds) = query.build_count_sql();
        let total: i64 = bind_values(sqlx::query(&count_sql), &count_binds)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let (select_sql, select_binds) = query.build_select_sql(limit, offset);
        let rows = bind_values(sqlx::query(&select_sql), &select_binds)
            .fetch_all(&self.pool)
            .await?;

        let results = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchPage { results, total })
    }
}

const STAFF_COLUMNS: &str =
    "id, username, password_hash, hospital_id, display_name, role, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresStaffStore {
    pool: PgPool,
}

impl PostgresStaffStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StaffStore for PostgresStaffStore {
    async fn create(&self, staff: Staff) -> Result<Staff> {
        let sql = format!(
            "INSERT INTO staffs (id, username, password_hash, hospital_id, display_name, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {STAFF_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(staff.id)
            .bind(&staff.username)
            .bind(&staff.password_hash)
            .bind(&staff.hospital_id)
            .bind(staff.display_name.as_deref())
            .bind(&staff.role)
            .fetch_one(&self.pool)
            .await?;
        row_to_staff(&row)
    }

    async fn get_by_username(&self, username: &str, hospital_id: &str) -> Result<Option<Staff>> {
        let sql = format!(
            "SELECT {STAFF_COLUMNS} FROM staffs WHERE username = $1 AND hospital_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .bind(hospital_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_staff).transpose()
    }
}

fn row_to_staff(row: &PgRow) -> Result<Staff> {
    Ok(Staff {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        hospital_id: row.try_get("hospital_id")?,
        display_name: row.try_get("display_name")?,
        role: row.try_get("role")?,
        created_at: Some(row.try_get("created_at")?),
        updated_at: Some(row.try_get("updated_at")?),
    })
}

/// `INSERT` for all record columns, with the conflict clause of `plan` when given.
///
/// `$1` is the id; a missing id is generated in SQL. The preserved identifier keeps its
/// stored value unless the incoming row carries one.
fn insert_sql(plan: Option<UpsertPlan>) -> String {
    let mut sql = String::from(
        "INSERT INTO patients (\
             id, patient_hn, national_id, passport_id, \
             first_name_th, middle_name_th, last_name_th, \
             first_name_en, middle_name_en, last_name_en, \
             date_of_birth, phone_number, email, gender, raw_payload, hospital_id, \
             created_at, updated_at\
         ) VALUES (\
             COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, \
             $11, $12, $13, $14, $15, $16, NOW(), NOW()\
         )",
    );

    let conflict = plan.and_then(|p| Some((p.conflict_column()?, p.preserved_column()?)));
    if let Some((key, preserved)) = conflict {
        sql.push_str(&format!(
            " ON CONFLICT (hospital_id, {key}) DO UPDATE SET \
             patient_hn = EXCLUDED.patient_hn, \
             {preserved} = COALESCE(EXCLUDED.{preserved}, patients.{preserved}), \
             first_name_th = EXCLUDED.first_name_th, \
             middle_name_th = EXCLUDED.middle_name_th, \
             last_name_th = EXCLUDED.last_name_th, \
             first_name_en = EXCLUDED.first_name_en, \
             middle_name_en = EXCLUDED.middle_name_en, \
             last_name_en = EXCLUDED.last_name_en, \
             date_of_birth = EXCLUDED.date_of_birth, \
             phone_number = EXCLUDED.phone_number, \
             email = EXCLUDED.email, \
             gender = EXCLUDED.gender, \
             raw_payload = EXCLUDED.raw_payload, \
             updated_at = NOW()"
        ));
    }

    sql.push_str(&format!(" RETURNING {PATIENT_COLUMNS}"));
    sql
}

fn bind_record<'q>(
    query: Query<'q, Postgres, PgArguments>,
    record: &'q PatientRecord,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(record.id)
        .bind(record.patient_hn.as_deref())
        .bind(record.national_id.as_deref())
        .bind(record.passport_id.as_deref())
        .bind(record.first_name_th.as_deref())
        .bind(record.middle_name_th.as_deref())
        .bind(record.last_name_th.as_deref())
        .bind(record.first_name_en.as_deref())
        .bind(record.middle_name_en.as_deref())
        .bind(record.last_name_en.as_deref())
        .bind(record.date_of_birth)
        .bind(record.phone_number.as_deref())
        .bind(record.email.as_deref())
        .bind(record.gender.as_deref())
        .bind(record.raw_payload.as_deref())
        .bind(record.hospital_id.as_deref().unwrap_or(""))
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: &'q [BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in binds {
        query = match value {
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Date(v) => query.bind(*v),
            BindValue::BigInt(v) => query.bind(*v),
        };
    }
    query
}

fn row_to_record(row: &PgRow) -> Result<PatientRecord> {
    let hospital_id: String = row.try_get("hospital_id")?;
    Ok(PatientRecord {
        id: Some(row.try_get("id")?),
        patient_hn: row.try_get("patient_hn")?,
        national_id: row.try_get("national_id")?,
        passport_id: row.try_get("passport_id")?,
        first_name_th: row.try_get("first_name_th")?,
        middle_name_th: row.try_get("middle_name_th")?,
        last_name_th: row.try_get("last_name_th")?,
        first_name_en: row.try_get("first_name_en")?,
        middle_name_en: row.try_get("middle_name_en")?,
        last_name_en: row.try_get("last_name_en")?,
        date_of_birth: row.try_get("date_of_birth")?,
        phone_number: row.try_get("phone_number")?,
        email: row.try_get("email")?,
        gender: row.try_get("gender")?,
        raw_payload: row.try_get("raw_payload")?,
        hospital_id: crate::models::patient::non_blank(Some(hospital_id)),
        created_at: Some(row.try_get("created_at")?),
        updated_at: Some(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_insert_has_no_conflict_clause() {
        let sql = insert_sql(Some(UpsertPlan::PlainInsert));
        assert!(!sql.contains("ON CONFLICT"));
        assert!(sql.ends_with(&format!("RETURNING {PATIENT_COLUMNS}")));
        assert_eq!(sql, insert_sql(None));
    }

    #[test]
    fn national_plan_targets_national_key_and_preserves_passport() {
        let sql = insert_sql(Some(UpsertPlan::ByNationalId));
        assert!(sql.contains("ON CONFLICT (hospital_id, national_id) DO UPDATE"));
        assert!(sql.contains("passport_id = COALESCE(EXCLUDED.passport_id, patients.passport_id)"));
        assert!(!sql.contains("national_id = EXCLUDED"));
        assert!(!sql.contains("created_at = "));
        assert!(!sql.contains("id = EXCLUDED.id"));
    }

    #[test]
    fn passport_plan_preserves_national_id() {
        let sql = insert_sql(Some(UpsertPlan::ByPassportId));
        assert!(sql.contains("ON CONFLICT (hospital_id, passport_id) DO UPDATE"));
        assert!(sql.contains("national_id = COALESCE(EXCLUDED.national_id, patients.national_id)"));
    }
}
