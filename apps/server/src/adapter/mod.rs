//! External hospital source.
//!
//! The authoritative demographic system lives outside this service. The resolver only
//! depends on [`HospitalSource`]; [`HospitalHttpClient`] is the production implementation
//! and [`mock`] provides a local stand-in for development.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PatientRecord;

pub use http::HospitalHttpClient;

/// Failure talking to the external hospital source.
///
/// A definitive "not found" from the remote is *not* an error; it is `Ok(None)`.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("hospital source request timed out")]
    Timeout,

    #[error("hospital source transport error: {0}")]
    Transport(String),

    #[error("hospital source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("hospital source response could not be decoded: {0}")]
    Decode(String),

    #[error("hospital source misconfigured: {0}")]
    Misconfigured(String),
}

/// Lookup capability against the external hospital system.
///
/// Implementations receive no hospital scope; the resolver assigns it afterwards.
#[async_trait]
pub trait HospitalSource: Send + Sync {
    /// Look up a patient by national ID or passport number.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - The remote knows the patient (no `id`, no `hospital_id`)
    /// * `Ok(None)` - The remote definitively does not know the identifier
    /// * `Err(_)` - Timeout, transport failure or any other non-success response
    async fn lookup(&self, identifier: &str) -> Result<Option<PatientRecord>, AdapterError>;
}
