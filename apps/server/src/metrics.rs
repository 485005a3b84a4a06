//! Metrics collection for the patient lookup service
//!
//! Prometheus metrics, registered in the default registry and exposed on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "patient_lookup_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "patient_lookup_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "patient_lookup_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    pub static ref HTTP_RESPONSE_SIZE_BYTES: HistogramVec = register_histogram_vec!(
        "patient_lookup_http_response_size_bytes",
        "HTTP response size in bytes",
        &["method", "path", "status"],
        vec![100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]
    )
    .expect("Failed to register HTTP_RESPONSE_SIZE_BYTES");

    // Identity Resolution Metrics

    /// Resolver outcomes: cache_hit, external_hit, external_absent, failure
    pub static ref RESOLVER_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "patient_lookup_resolver_outcomes_total",
        "Identity resolution outcomes",
        &["outcome"]
    )
    .expect("Failed to register RESOLVER_OUTCOMES_TOTAL");

    /// External hospital source latency by outcome
    pub static ref HOSPITAL_LOOKUP_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "patient_lookup_hospital_lookup_duration_seconds",
        "External hospital lookup duration in seconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
    )
    .expect("Failed to register HOSPITAL_LOOKUP_DURATION_SECONDS");

    // Search Metrics

    /// Searches by kind (filter, identifier) and status
    pub static ref SEARCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "patient_lookup_search_total",
        "Total number of patient searches",
        &["kind", "status"]
    )
    .expect("Failed to register SEARCH_TOTAL");

    /// Unpaged match count per search
    pub static ref SEARCH_MATCHES: HistogramVec = register_histogram_vec!(
        "patient_lookup_search_matches",
        "Number of records matched by a search, ignoring paging",
        &["kind"],
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    )
    .expect("Failed to register SEARCH_MATCHES");

    // Audit Metrics

    /// Audit events: enqueued, deferred, dropped, written, failed
    pub static ref AUDIT_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "patient_lookup_audit_events_total",
        "Search audit events by outcome",
        &["outcome"]
    )
    .expect("Failed to register AUDIT_EVENTS_TOTAL");

    // Database Metrics

    pub static ref DB_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "patient_lookup_db_connections_active",
        "Number of active database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_ACTIVE");

    pub static ref DB_CONNECTIONS_IDLE: IntGauge = register_int_gauge!(
        "patient_lookup_db_connections_idle",
        "Number of idle database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_IDLE");
}

/// Collapse identifiers out of a request path to keep label cardinality bounded
pub fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => "/".to_string(),
        ["v1", "patient", "search", _] => "/v1/patient/search/{identifier}".to_string(),
        ["v1", "patient", "search"] => "/v1/patient/search".to_string(),
        ["v1", "patient", _] => "/v1/patient/{identifier}".to_string(),
        ["v1", "patients"]
        | ["patient", "search"]
        | ["staff", "create" | "login"]
        | ["health"]
        | ["metrics"] => {
            format!("/{}", segments.join("/"))
        }
        _ => "/{unmatched}".to_string(),
    }
}
