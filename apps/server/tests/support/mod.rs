//! Shared harness for the HTTP-level tests.
//!
//! Every test gets its own in-memory patient and staff stores, a scripted hospital source
//! and a recording audit sink, wired through the same `AppState::from_parts` the server uses.

pub mod fixtures;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use patient_lookup::{
    adapter::{AdapterError, HospitalSource},
    api::create_router,
    auth::StaffClaims,
    db::{InMemoryPatientStore, InMemoryStaffStore, PatientStore},
    models::PatientRecord,
    services::{AuditSink, SearchEvent},
    AppState, Config,
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tower::ServiceExt as _;

pub use fixtures::*;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Hospital source answering from a fixed table. Identifiers starting with `FAIL-`
/// produce an upstream error.
#[derive(Default)]
pub struct ScriptedSource {
    records: std::sync::Mutex<HashMap<String, PatientRecord>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn insert(&self, identifier: &str, record: PatientRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(identifier.to_string(), record);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HospitalSource for ScriptedSource {
    async fn lookup(&self, identifier: &str) -> Result<Option<PatientRecord>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if identifier.starts_with("FAIL-") {
            return Err(AdapterError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(self.records.lock().unwrap().get(identifier).cloned())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<SearchEvent>>,
}

impl RecordingAuditSink {
    pub async fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().await.clone()
    }

    /// Wait until at least `count` events arrived; the audit worker runs detached.
    pub async fn wait_for(&self, count: usize) -> anyhow::Result<Vec<SearchEvent>> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let events = self.events().await;
            if events.len() >= count {
                return Ok(events);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("expected {count} audit events, got {}", events.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn log_search(
        &self,
        staff_id: &str,
        hospital_id: &str,
        filter: &patient_lookup::models::PatientFilter,
        result_count: i64,
    ) -> patient_lookup::Result<()> {
        self.events.lock().await.push(SearchEvent {
            staff_id: staff_id.to_string(),
            hospital_id: hospital_id.to_string(),
            filter: filter.clone(),
            result_count,
        });
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryPatientStore>,
    pub staff_store: Arc<InMemoryStaffStore>,
    pub source: Arc<ScriptedSource>,
    pub audit: Arc<RecordingAuditSink>,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::new_with_config(|_| {}).await
    }

    pub async fn new_with_config(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let config = test_config(configure);
        let source = Arc::new(ScriptedSource::default());
        Self::with_source(config, source.clone(), source)
    }

    /// Build against an arbitrary hospital source; `scripted` is exposed as `app.source`
    /// but only consulted if it is the source actually wired in.
    pub fn with_source(
        config: Config,
        source: Arc<dyn HospitalSource>,
        scripted: Arc<ScriptedSource>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(InMemoryPatientStore::new());
        let staff_store = Arc::new(InMemoryStaffStore::new());
        let audit = Arc::new(RecordingAuditSink::default());

        let state = AppState::from_parts(
            config,
            store.clone(),
            staff_store.clone(),
            source,
            audit.clone(),
        )
        .context("initialize AppState")?;
        let router = create_router(state.clone());

        Ok(Self {
            router,
            state,
            store,
            staff_store,
            source: scripted,
            audit,
        })
    }

    /// Store `record` directly, bypassing the HTTP layer.
    pub async fn seed(&self, record: PatientRecord) -> anyhow::Result<PatientRecord> {
        self.store.upsert(record).await.context("seed patient")
    }

    pub fn token(&self, staff_id: &str, hospital_id: &str) -> String {
        mint_token(staff_id, Some(hospital_id), 3600)
    }

    pub async fn get(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        self.request(Method::GET, path, token, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let body = serde_json::to_vec(body).context("serialize request body")?;
        self.request(Method::POST, path, token, Some(body)).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .context("build request")?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok((status, headers, json))
    }
}

pub fn test_config(configure: impl FnOnce(&mut Config)) -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.hospital.base_url = "http://127.0.0.1:9".to_string();
    // Cheapest cost bcrypt accepts; keeps staff tests fast.
    config.auth.bcrypt_cost = 4;
    configure(&mut config);
    config
}

pub fn mint_token(staff_id: &str, hospital_id: Option<&str>, expires_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = StaffClaims {
        sub: staff_id.to_string(),
        hospital_id: hospital_id.map(str::to_string),
        username: Some(format!("{staff_id}-user")),
        role: Some("staff".to_string()),
        exp: (now + expires_in) as u64,
        iat: Some(now as u64),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("sign test token")
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(actual, expected, "unexpected status for {context}");
}
