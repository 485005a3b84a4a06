//! Search audit trail.
//!
//! Every search attributed to a staff member produces one [`SearchEvent`]. Events are
//! handed to a bounded queue and written by a background worker, so the search response
//! never waits on (or fails because of) the audit write.

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{models::PatientFilter, Result};

/// Log target of [`TracingAuditSink`] events.
pub const AUDIT_TARGET: &str = "patient_lookup::audit";

/// One audited search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEvent {
    pub staff_id: String,
    pub hospital_id: String,
    /// The filter actually executed (after identifier fallback).
    pub filter: PatientFilter,
    pub result_count: i64,
}

/// Destination for search audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_search(
        &self,
        staff_id: &str,
        hospital_id: &str,
        filter: &PatientFilter,
        result_count: i64,
    ) -> Result<()>;
}

/// Appends events to the `search_events` table.
#[derive(Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn log_search(
        &self,
        staff_id: &str,
        hospital_id: &str,
        filter: &PatientFilter,
        result_count: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_events (staff_id, hospital_id, filters, result_count)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(staff_id)
        .bind(hospital_id)
        .bind(Json(filter))
        .bind(result_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Writes events as structured log lines. Used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_search(
        &self,
        staff_id: &str,
        hospital_id: &str,
        filter: &PatientFilter,
        result_count: i64,
    ) -> Result<()> {
        let filters = serde_json::to_string(filter)
            .map_err(|e| crate::Error::Internal(format!("Failed to encode audit filter: {e}")))?;
        tracing::info!(
            target: AUDIT_TARGET,
            staff_id,
            hospital_id,
            filters = %filters,
            result_count,
            "Patient search"
        );
        Ok(())
    }
}

/// Fire-and-forget front end for an [`AuditSink`].
///
/// Cheap to clone; all clones feed the same worker. The worker stops once every clone
/// has been dropped and the queue has drained.
#[derive(Clone)]
pub struct SearchAuditor {
    sender: Option<mpsc::Sender<SearchEvent>>,
}

impl SearchAuditor {
    /// Start the background worker draining into `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, queue_capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SearchEvent>(queue_capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match sink
                    .log_search(
                        &event.staff_id,
                        &event.hospital_id,
                        &event.filter,
                        event.result_count,
                    )
                    .await
                {
                    Ok(()) => record_outcome("written"),
                    Err(e) => {
                        record_outcome("failed");
                        tracing::warn!(
                            staff_id = %event.staff_id,
                            hospital_id = %event.hospital_id,
                            "Failed to persist search audit event: {}",
                            e
                        );
                    }
                }
            }
            tracing::debug!("Search audit worker stopped");
        });

        tracing::info!(queue_capacity, "Search audit logging initialized");

        Self {
            sender: Some(sender),
        }
    }

    /// An auditor that discards every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue `event` without waiting.
    pub fn record(&self, event: SearchEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => record_outcome("enqueued"),
            Err(TrySendError::Full(event)) => {
                record_outcome("deferred");
                // Keep the caller's latency flat; wait for queue space off the request path.
                let sender = sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(event).await {
                        record_outcome("dropped");
                        tracing::warn!("Failed to enqueue search audit event: {}", e);
                    }
                });
            }
            Err(TrySendError::Closed(_event)) => {
                record_outcome("dropped");
                tracing::warn!("Search audit queue closed; dropping event");
            }
        }
    }
}

fn record_outcome(outcome: &str) {
    crate::metrics::AUDIT_EVENTS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}
