//! HTTP request handlers

pub mod metrics;
pub mod patient;
pub mod search;
pub mod staff;
