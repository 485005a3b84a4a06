//! Service configuration.
//!
//! Resolved once at startup and passed into the services; nothing reads the process
//! environment while handling requests. Sources, lowest precedence first:
//! 1. Built-in defaults (the `Default` impls below)
//! 2. `config.yaml` in the working directory, or the file given by `--config` or
//!    `PATIENT_LOOKUP_CONFIG`
//! 3. `PATIENT_LOOKUP_<SECTION>__<KEY>` environment variables (e.g. `PATIENT_LOOKUP_SERVER__PORT`)
//! 4. The conventional `DATABASE_URL`, `JWT_SECRET`, `JWT_EXPIRES_SECONDS`, `HOSPITAL_BASE`
//!    and `PORT` variables
//!
//! A `.env` file is loaded into the environment before any of the above.

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;

const CONFIG_PATH_ENV: &str = "PATIENT_LOOKUP_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config";
const ENV_PREFIX: &str = "PATIENT_LOOKUP";

/// bcrypt's accepted cost range (mirrors the `bcrypt` crate's private `MIN_COST`/`MAX_COST`).
pub const BCRYPT_MIN_COST: u32 = 4;
pub const BCRYPT_MAX_COST: u32 = 31;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub hospital: HospitalConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_body_size: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

/// PostgreSQL settings. Without a `url` the service runs on the in-memory store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_min_size: 0,
            pool_max_size: 5,
            pool_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HospitalConfig {
    pub base_url: String,
    /// Per-lookup timeout for the external source.
    pub timeout_ms: u64,
}

impl Default for HospitalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://hospital-a.api.co.th".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 shared secret used to sign and verify staff access tokens.
    pub jwt_secret: String,
    pub leeway_seconds: u64,
    /// Lifetime of tokens issued by `POST /staff/login`.
    pub token_ttl_seconds: u64,
    pub password_min_length: usize,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            leeway_seconds: 30,
            token_ttl_seconds: 3600,
            password_min_length: 6,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default page size of `POST /patient/search`.
    pub legacy_default_limit: i64,
    /// Default page size of `POST /v1/patient/search`.
    pub default_limit: i64,
    /// Upper bound on the page size of `POST /v1/patient/search`.
    pub max_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            legacy_default_limit: 10,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// `daily`, `hourly`, `minutely` or `never`.
    pub file_rotation: String,
    /// Separate JSON log holding only search audit events.
    pub audit_file_enabled: bool,
    pub audit_file_prefix: String,
    pub opentelemetry_enabled: bool,
    pub otlp_endpoint: String,
    pub otlp_timeout_seconds: u64,
    pub trace_sample_ratio: f64,
    pub service_name: String,
    pub service_version: Option<String>,
    pub deployment_environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "logs".to_string(),
            file_prefix: "patient-lookup".to_string(),
            file_rotation: "daily".to_string(),
            audit_file_enabled: false,
            audit_file_prefix: "search-audit".to_string(),
            opentelemetry_enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            otlp_timeout_seconds: 10,
            trace_sample_ratio: 1.0,
            service_name: "patient-lookup".to_string(),
            service_version: None,
            deployment_environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment and `.env`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default config file.
    pub fn load_from(path: Option<&str>) -> anyhow::Result<Self> {
        // A missing .env is fine.
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => path.to_string(),
            None => std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string()),
        };

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .set_override_option("database.url", env_override("DATABASE_URL"))?
            .set_override_option("auth.jwt_secret", env_override("JWT_SECRET"))?
            .set_override_option("auth.token_ttl_seconds", env_override("JWT_EXPIRES_SECONDS"))?
            .set_override_option("hospital.base_url", env_override("HOSPITAL_BASE"))?
            .set_override_option("server.port", env_override("PORT"))?
            .build()
            .with_context(|| format!("Failed to read configuration (file: {file})"))?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err("auth.jwt_secret (JWT_SECRET) must be set".to_string());
        }
        if self.auth.token_ttl_seconds == 0 {
            return Err("auth.token_ttl_seconds must be greater than zero".to_string());
        }
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&self.auth.bcrypt_cost) {
            return Err(format!(
                "auth.bcrypt_cost must be within {}..={}",
                BCRYPT_MIN_COST,
                BCRYPT_MAX_COST
            ));
        }
        if self.hospital.base_url.trim().is_empty() {
            return Err("hospital.base_url must be set".to_string());
        }
        if self.hospital.timeout_ms == 0 {
            return Err("hospital.timeout_ms must be greater than zero".to_string());
        }
        if self.database.pool_max_size == 0 {
            return Err("database.pool_max_size must be greater than zero".to_string());
        }
        if self.database.pool_min_size > self.database.pool_max_size {
            return Err("database.pool_min_size exceeds database.pool_max_size".to_string());
        }
        if self.search.legacy_default_limit <= 0 || self.search.default_limit <= 0 {
            return Err("search default limits must be positive".to_string());
        }
        if self.search.default_limit > self.search.max_limit {
            return Err("search.default_limit exceeds search.max_limit".to_string());
        }
        if self.audit.queue_capacity == 0 {
            return Err("audit.queue_capacity must be greater than zero".to_string());
        }
        if self.logging.audit_file_enabled
            && self.logging.file_enabled
            && self.logging.audit_file_prefix == self.logging.file_prefix
        {
            return Err("logging.audit_file_prefix must differ from logging.file_prefix".to_string());
        }
        if !(0.0..=1.0).contains(&self.logging.trace_sample_ratio) {
            return Err("logging.trace_sample_ratio must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
