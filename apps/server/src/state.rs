//! Shared application state handed to every handler.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::{
    adapter::{HospitalHttpClient, HospitalSource},
    auth::AuthManager,
    db::{
        self, InMemoryPatientStore, InMemoryStaffStore, PatientStore, PostgresPatientStore,
        PostgresStaffStore, StaffStore,
    },
    services::{
        AuditSink, IdentityResolver, PatientSearchService, PostgresAuditSink, SearchAuditor,
        StaffService, TracingAuditSink,
    },
    Config,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn PatientStore>,
    pub resolver: Arc<IdentityResolver>,
    pub search: Arc<PatientSearchService>,
    pub staff: Arc<StaffService>,
    pub auth: Arc<AuthManager>,
    /// Present when running against PostgreSQL.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Build the production wiring described by `config`.
    ///
    /// With a database URL the PostgreSQL stores and audit table are used; otherwise
    /// records and staff accounts live in memory and audit events go to the log.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let source: Arc<dyn HospitalSource> = Arc::new(
            HospitalHttpClient::new(&config.hospital)
                .context("Failed to create hospital source client")?,
        );

        let store: Arc<dyn PatientStore>;
        let staff_store: Arc<dyn StaffStore>;
        let audit_sink: Arc<dyn AuditSink>;
        let mut db_pool = None;

        if config.database.url.is_some() {
            let pool = db::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            if config.database.run_migrations {
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("Database migrations applied");
            }
            store = Arc::new(PostgresPatientStore::new(pool.clone()));
            staff_store = Arc::new(PostgresStaffStore::new(pool.clone()));
            audit_sink = Arc::new(PostgresAuditSink::new(pool.clone()));
            db_pool = Some(pool);
        } else {
            tracing::warn!("No database configured; patient records are kept in memory only");
            store = Arc::new(InMemoryPatientStore::new());
            staff_store = Arc::new(InMemoryStaffStore::new());
            audit_sink = Arc::new(TracingAuditSink);
        }

        let mut state = Self::from_parts(config, store, staff_store, source, audit_sink)?;
        state.db_pool = db_pool;
        Ok(state)
    }

    /// Assemble state from explicit collaborators.
    ///
    /// Spawns the audit worker, so it must run inside a Tokio runtime.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn PatientStore>,
        staff_store: Arc<dyn StaffStore>,
        source: Arc<dyn HospitalSource>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> anyhow::Result<Self> {
        let auth = AuthManager::new(&config.auth)
            .map_err(|e| anyhow::anyhow!("Failed to initialize authentication: {e:?}"))?;

        let auditor = if config.audit.enabled {
            SearchAuditor::spawn(audit_sink, config.audit.queue_capacity)
        } else {
            tracing::info!("Search auditing disabled");
            SearchAuditor::disabled()
        };

        let resolver = IdentityResolver::new(store.clone(), source);
        let search = PatientSearchService::new(store.clone(), auditor);
        let staff = StaffService::new(staff_store, auth.clone(), &config.auth);

        Ok(Self {
            config: Arc::new(config),
            store,
            resolver: Arc::new(resolver),
            search: Arc::new(search),
            staff: Arc::new(staff),
            auth: Arc::new(auth),
            db_pool: None,
        })
    }
}
