//! Identity resolution - read-through cache over the external hospital source.
//!
//! The local store is consulted first and is authoritative once it holds a record. On a
//! miss the external source is queried and a positive answer is persisted through the
//! store's merge-aware upsert before it is returned.

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    adapter::HospitalSource, db::PatientStore, models::PatientRecord, Error, Result,
};

enum Resolved {
    Cached(PatientRecord),
    Fetched(PatientRecord),
    Absent,
}

impl Resolved {
    fn outcome(&self) -> &'static str {
        match self {
            Resolved::Cached(_) => "cache_hit",
            Resolved::Fetched(_) => "external_hit",
            Resolved::Absent => "external_absent",
        }
    }

    fn into_record(self) -> Option<PatientRecord> {
        match self {
            Resolved::Cached(record) | Resolved::Fetched(record) => Some(record),
            Resolved::Absent => None,
        }
    }
}

/// Resolves an external identifier to a durable patient record.
///
/// Holds no lock across calls. Two concurrent misses for the same identifier may both
/// query the source; the store's upsert makes them converge on one row.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn PatientStore>,
    source: Arc<dyn HospitalSource>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn PatientStore>, source: Arc<dyn HospitalSource>) -> Self {
        Self { store, source }
    }

    /// Resolve `identifier` (national ID or passport number)
    ///
    /// # Arguments
    /// * `identifier` - Matched against both identifier columns
    /// * `hospital_scope` - Assigned to a fetched record that carries no hospital
    ///
    /// # Returns
    /// * `Ok(Some(record))` - Found locally, or fetched and persisted
    /// * `Ok(None)` - Unknown locally and the source definitively does not know it
    ///
    /// # Errors
    /// * `Validation` - If `identifier` is blank
    /// * `Database`/`Conflict` - If the store fails, including when persisting a fetch
    /// * `Adapter` - If the source times out or answers with a failure
    #[tracing::instrument(skip(self), fields(outcome = tracing::field::Empty))]
    pub async fn resolve(
        &self,
        identifier: &str,
        hospital_scope: Option<&str>,
    ) -> Result<Option<PatientRecord>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::Validation("identifier must not be blank".to_string()));
        }

        let outcome = match self.resolve_inner(identifier, hospital_scope).await {
            Ok(resolved) => {
                tracing::Span::current().record("outcome", resolved.outcome());
                record_outcome(resolved.outcome());
                resolved
            }
            Err(e) => {
                tracing::Span::current().record("outcome", "failure");
                record_outcome("failure");
                tracing::warn!(error = %e, "Identity resolution failed");
                return Err(e);
            }
        };

        Ok(outcome.into_record())
    }

    async fn resolve_inner(
        &self,
        identifier: &str,
        hospital_scope: Option<&str>,
    ) -> Result<Resolved> {
        if let Some(record) = self.store.get_by_identifier(identifier).await? {
            return Ok(Resolved::Cached(record));
        }

        let Some(fetched) = self.source.lookup(identifier).await? else {
            return Ok(Resolved::Absent);
        };

        let mut record = fetched.normalized();
        record.id.get_or_insert_with(Uuid::new_v4);
        if record.hospital_id.is_none() {
            record.hospital_id = hospital_scope
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }

        let stored = self.store.upsert(record).await?;
        tracing::debug!(patient_id = ?stored.id, "Persisted patient from hospital source");
        Ok(Resolved::Fetched(stored))
    }
}

fn record_outcome(outcome: &str) {
    crate::metrics::RESOLVER_OUTCOMES_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::db::InMemoryPatientStore;
    use crate::models::{PatientFilter, SearchPage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every lookup with the configured response and counts calls.
    struct StubSource {
        response: std::result::Result<Option<PatientRecord>, AdapterError>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(response: std::result::Result<Option<PatientRecord>, AdapterError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HospitalSource for StubSource {
        async fn lookup(
            &self,
            _identifier: &str,
        ) -> std::result::Result<Option<PatientRecord>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    /// Answers after a pause so concurrent misses overlap inside the source call.
    struct SlowSource {
        record: PatientRecord,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HospitalSource for SlowSource {
        async fn lookup(
            &self,
            _identifier: &str,
        ) -> std::result::Result<Option<PatientRecord>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(Some(self.record.clone()))
        }
    }

    /// Reads succeed with nothing; every write fails.
    struct ReadOnlyStore;

    #[async_trait]
    impl PatientStore for ReadOnlyStore {
        async fn get_by_id(&self, _id: Uuid) -> Result<Option<PatientRecord>> {
            Ok(None)
        }
        async fn get_by_identifier(&self, _identifier: &str) -> Result<Option<PatientRecord>> {
            Ok(None)
        }
        async fn create(&self, _record: PatientRecord) -> Result<PatientRecord> {
            Err(Error::Internal("read-only".into()))
        }
        async fn upsert(&self, _record: PatientRecord) -> Result<PatientRecord> {
            Err(Error::Internal("read-only".into()))
        }
        async fn search(
            &self,
            _hospital_id: &str,
            _filter: &PatientFilter,
            _limit: i64,
            _offset: i64,
        ) -> Result<SearchPage> {
            Ok(SearchPage::default())
        }
    }

    fn remote(national: &str) -> PatientRecord {
        PatientRecord {
            national_id: Some(national.to_string()),
            first_name_en: Some("Manop".to_string()),
            raw_payload: Some(b"{}".to_vec()),
            ..PatientRecord::empty()
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_source() {
        let store = Arc::new(InMemoryPatientStore::new());
        let existing = store
            .create(PatientRecord {
                hospital_id: Some("H1".into()),
                ..remote("N-1")
            })
            .await
            .unwrap();
        let source = StubSource::new(Ok(Some(remote("N-1"))));
        let resolver = IdentityResolver::new(store, source.clone());

        let found = resolver.resolve("N-1", Some("H2")).await.unwrap();
        assert_eq!(found, Some(existing));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn miss_fetches_persists_and_scopes() {
        let store = Arc::new(InMemoryPatientStore::new());
        let source = StubSource::new(Ok(Some(remote("N-1"))));
        let resolver = IdentityResolver::new(store.clone(), source.clone());

        let resolved = resolver.resolve("N-1", Some("H1")).await.unwrap().unwrap();
        assert!(resolved.id.is_some());
        assert_eq!(resolved.hospital_id.as_deref(), Some("H1"));
        assert_eq!(resolved.raw_payload.as_deref(), Some(&b"{}"[..]));
        assert_eq!(store.len().await, 1);

        // Second call is served from the store.
        let again = resolver.resolve("N-1", Some("H1")).await.unwrap().unwrap();
        assert_eq!(again.id, resolved.id);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn remote_hospital_is_kept_when_present() {
        let store = Arc::new(InMemoryPatientStore::new());
        let source = StubSource::new(Ok(Some(PatientRecord {
            hospital_id: Some("REMOTE".into()),
            ..remote("N-1")
        })));
        let resolver = IdentityResolver::new(store, source);

        let resolved = resolver.resolve("N-1", Some("H1")).await.unwrap().unwrap();
        assert_eq!(resolved.hospital_id.as_deref(), Some("REMOTE"));
    }

    #[tokio::test]
    async fn definitive_absence_writes_nothing() {
        let store = Arc::new(InMemoryPatientStore::new());
        let resolver = IdentityResolver::new(store.clone(), StubSource::new(Ok(None)));

        assert_eq!(resolver.resolve("N-404", Some("H1")).await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn adapter_failure_is_not_absence() {
        let store = Arc::new(InMemoryPatientStore::new());
        let resolver =
            IdentityResolver::new(store.clone(), StubSource::new(Err(AdapterError::Timeout)));

        let err = resolver.resolve("N-1", Some("H1")).await.unwrap_err();
        assert!(matches!(err, Error::Adapter(AdapterError::Timeout)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn failed_persist_fails_the_resolution() {
        let source = StubSource::new(Ok(Some(remote("N-1"))));
        let resolver = IdentityResolver::new(Arc::new(ReadOnlyStore), source);

        let err = resolver.resolve("N-1", Some("H1")).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn fetched_record_colliding_on_other_identifier_is_a_conflict() {
        let store = Arc::new(InMemoryPatientStore::new());
        // Stored under a passport only; the remote returns both identifiers.
        let existing = store
            .create(PatientRecord {
                passport_id: Some("P-1".into()),
                hospital_id: Some("H1".into()),
                ..PatientRecord::empty()
            })
            .await
            .unwrap();
        let source = StubSource::new(Ok(Some(PatientRecord {
            passport_id: Some("P-1".into()),
            ..remote("N-1")
        })));
        let resolver = IdentityResolver::new(store.clone(), source);

        // "N-1" is unknown locally, so the source is asked; the write collides on passport.
        let err = resolver.resolve("N-1", Some("H1")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.all().await, vec![existing]);
    }

    #[tokio::test]
    async fn concurrent_misses_converge_on_one_row() {
        let store = Arc::new(InMemoryPatientStore::new());
        let source = Arc::new(SlowSource {
            record: remote("N-1"),
            calls: AtomicUsize::new(0),
        });
        let resolver = IdentityResolver::new(store.clone(), source.clone());

        let (a, b) = tokio::join!(
            resolver.resolve("N-1", Some("H1")),
            resolver.resolve("N-1", Some("H1"))
        );
        let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

        // Both calls missed locally and went upstream.
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.id, b.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn blank_identifier_is_rejected() {
        let store = Arc::new(InMemoryPatientStore::new());
        let source = StubSource::new(Ok(None));
        let resolver = IdentityResolver::new(store, source.clone());

        let err = resolver.resolve("  ", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(source.calls(), 0);
    }
}
