//! Search service - hospital-scoped patient search
//!
//! Delegates predicate evaluation to the patient store and layers two policies on top:
//! - An opaque identifier is tried as a national ID first and as a passport number only
//!   when that finds nothing
//! - Searches attributed to a staff member are audited without delaying the response

use std::sync::Arc;

use crate::{
    db::PatientStore,
    models::{PatientFilter, SearchPage},
    services::audit::{SearchAuditor, SearchEvent},
    Error, Result,
};

/// Who a search is executed on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct SearchScope<'a> {
    pub hospital_id: &'a str,
    /// Staff member to attribute the search to. Unattributed searches are not audited.
    pub staff_id: Option<&'a str>,
}

/// Paging window, passed through to the store unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct PatientSearchService {
    store: Arc<dyn PatientStore>,
    auditor: SearchAuditor,
}

impl PatientSearchService {
    pub fn new(store: Arc<dyn PatientStore>, auditor: SearchAuditor) -> Self {
        Self { store, auditor }
    }

    /// Run `filter` within one hospital scope.
    ///
    /// Blank filter fields are ignored; an empty filter lists the whole scope.
    #[tracing::instrument(skip(self, filter), fields(hospital_id = scope.hospital_id))]
    pub async fn search(
        &self,
        scope: SearchScope<'_>,
        filter: PatientFilter,
        paging: Paging,
    ) -> Result<SearchPage> {
        let filter = filter.normalized();
        let page = self
            .store
            .search(scope.hospital_id, &filter, paging.limit, paging.offset)
            .await;

        let page = finish("filter", page)?;
        self.audit(scope, filter, page.total);
        Ok(page)
    }

    /// Search by an identifier of unknown family.
    ///
    /// Runs a national-ID-only filter, then a passport-only filter if the first matched
    /// nothing. Exactly one search event is audited, carrying the filter that produced
    /// the returned page.
    #[tracing::instrument(skip(self), fields(hospital_id = scope.hospital_id, matched_on = tracing::field::Empty))]
    pub async fn search_by_identifier(
        &self,
        scope: SearchScope<'_>,
        identifier: &str,
        paging: Paging,
    ) -> Result<SearchPage> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::Validation("identifier must not be blank".to_string()));
        }

        let by_national = PatientFilter::by_national_id(identifier);
        let page = self
            .store
            .search(scope.hospital_id, &by_national, paging.limit, paging.offset)
            .await;
        let page = finish("identifier", page)?;

        let (filter, page) = if page.total > 0 {
            tracing::Span::current().record("matched_on", "national_id");
            (by_national, page)
        } else {
            let by_passport = PatientFilter::by_passport_id(identifier);
            let page = self
                .store
                .search(scope.hospital_id, &by_passport, paging.limit, paging.offset)
                .await;
            let page = finish("identifier", page)?;
            if page.total > 0 {
                tracing::Span::current().record("matched_on", "passport_id");
            }
            (by_passport, page)
        };

        self.audit(scope, filter, page.total);
        Ok(page)
    }

    fn audit(&self, scope: SearchScope<'_>, filter: PatientFilter, total: i64) {
        if let Some(staff_id) = scope.staff_id {
            self.auditor.record(SearchEvent {
                staff_id: staff_id.to_string(),
                hospital_id: scope.hospital_id.to_string(),
                filter,
                result_count: total,
            });
        }
    }
}

fn finish(kind: &str, page: Result<SearchPage>) -> Result<SearchPage> {
    match &page {
        Ok(p) => {
            crate::metrics::SEARCH_TOTAL
                .with_label_values(&[kind, "success"])
                .inc();
            crate::metrics::SEARCH_MATCHES
                .with_label_values(&[kind])
                .observe(p.total as f64);
        }
        Err(e) => {
            crate::metrics::SEARCH_TOTAL
                .with_label_values(&[kind, "error"])
                .inc();
            tracing::warn!(error = %e, "Patient search failed");
        }
    }
    page
}
