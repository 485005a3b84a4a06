//! Domain models for patient identity resolution and staff accounts

pub mod patient;
pub mod staff;

pub use patient::{PatientFilter, PatientRecord, SearchPage};
pub use staff::Staff;
