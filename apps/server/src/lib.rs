//! Patient lookup service
//!
//! Resolves patient identities across hospitals:
//! - Local record store keyed by national ID and passport number, per hospital
//! - Read-through resolution against an upstream hospital information system
//! - Hospital-scoped search with national ID to passport fallback
//! - Asynchronous audit trail of staff searches

#![allow(
    clippy::too_many_arguments,      // Store helpers bind every patient column
    clippy::large_enum_variant,      // Error variants carry sqlx errors
)]

pub mod adapter;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
