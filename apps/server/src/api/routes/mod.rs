//! Route tables

pub mod metrics;
pub mod patient;
pub mod staff;
