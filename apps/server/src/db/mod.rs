//! Database layer - patient and staff stores, query building

pub mod memory;
pub mod postgres;
pub mod query_builder;
pub mod traits;
pub mod upsert;

pub use memory::{InMemoryPatientStore, InMemoryStaffStore};
pub use postgres::{connect, run_migrations, PostgresPatientStore, PostgresStaffStore};
pub use query_builder::{BindValue, PatientQuery};
pub use traits::{PatientStore, StaffStore};
pub use upsert::UpsertPlan;
