//! Log and trace pipeline for the service binaries
//!
//! The subscriber is a stack of independently filtered layers over one registry:
//! console (JSON or human), an optional rotating service log, an optional rotating
//! search audit log that only sees [`AUDIT_TARGET`] events, and OTLP span export.
//! `RUST_LOG` overrides the configured level on every layer except the audit log.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{Sampler, TracerProvider},
    Resource,
};
use std::fs;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::config::LoggingConfig;
pub use crate::services::audit::AUDIT_TARGET;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps file writers flushing and the tracer provider alive. Hold it until exit.
pub struct TelemetryGuard {
    _writers: Vec<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<TelemetryGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut writers = Vec::new();

    layers.push(console_layer(config));

    if config.file_enabled {
        let (writer, guard) = rolling_writer(config, &config.file_prefix)?;
        writers.push(guard);
        layers.push(service_file_layer(config, writer));
    }

    if config.audit_file_enabled {
        let (writer, guard) = rolling_writer(config, &config.audit_file_prefix)?;
        writers.push(guard);
        layers.push(audit_file_layer(writer));
    }

    let mut otel_init_error = None;
    if config.opentelemetry_enabled {
        match init_tracer_provider(config) {
            Ok(provider) => {
                let tracer = provider.tracer("patient-lookup");
                layers.push(
                    tracing_opentelemetry::layer()
                        .with_tracer(tracer)
                        .with_tracked_inactivity(true)
                        .with_filter(build_env_filter(config))
                        .boxed(),
                );
                global::set_tracer_provider(provider);
            }
            Err(e) => otel_init_error = Some(e.to_string()),
        }
    }

    tracing_subscriber::registry().with(layers).init();

    if let Some(err) = otel_init_error {
        tracing::warn!(
            error = %err,
            "Failed to initialize OpenTelemetry tracer provider, continuing without OpenTelemetry"
        );
    }

    tracing::info!(
        otel_enabled = config.opentelemetry_enabled,
        audit_file = config.audit_file_enabled,
        service_name = %config.service_name,
        environment = %config.deployment_environment,
        "Logging initialized"
    );

    Ok(TelemetryGuard { _writers: writers })
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    if config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stdout)
            .with_filter(build_env_filter(config))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stdout)
            .with_filter(build_env_filter(config))
            .boxed()
    }
}

fn service_file_layer(config: &LoggingConfig, writer: NonBlocking) -> BoxedLayer {
    if config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .with_filter(build_env_filter(config))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(build_env_filter(config))
            .boxed()
    }
}

/// One flattened JSON object per audited search.
fn audit_file_layer(writer: NonBlocking) -> BoxedLayer {
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_writer(writer)
        .with_filter(audit_targets())
        .boxed()
}

fn audit_targets() -> Targets {
    Targets::new().with_target(AUDIT_TARGET, LevelFilter::INFO)
}

fn app_directives(config: &LoggingConfig) -> String {
    let level = &config.level;
    // sqlx logs every statement at info
    format!(
        "patient_lookup={level},patient_lookup_server={level},mock_hospital={level},\
         tower_http=info,sqlx=warn,reqwest=warn"
    )
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(app_directives(config)))
}

fn rolling_writer(
    config: &LoggingConfig,
    prefix: &str,
) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    use tracing_appender::rolling;

    fs::create_dir_all(&config.file_directory)?;
    let dir = &config.file_directory;
    let appender = match config.file_rotation.as_str() {
        "hourly" => rolling::hourly(dir, prefix),
        "minutely" => rolling::minutely(dir, prefix),
        "never" => rolling::never(dir, format!("{prefix}.log")),
        _ => rolling::daily(dir, prefix),
    };
    Ok(tracing_appender::non_blocking(appender))
}

fn sampler(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
    }
}

fn init_tracer_provider(config: &LoggingConfig) -> anyhow::Result<TracerProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(Duration::from_secs(config.otlp_timeout_seconds))
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to create OTLP exporter: {}", e))?;

    let service_version = config
        .service_version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", service_version),
        KeyValue::new(
            "deployment.environment",
            config.deployment_environment.clone(),
        ),
    ]);

    let trace_config = opentelemetry_sdk::trace::Config::default()
        .with_sampler(sampler(config.trace_sample_ratio))
        .with_resource(resource);

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_config(trace_config)
        .build())
}

/// Flush and shut down the global tracer provider. Also runs when the guard drops.
pub fn shutdown_telemetry() {
    tracing::info!("Shutting down OpenTelemetry...");
    global::shutdown_tracer_provider();
}

/// Environment-only logging for auxiliary binaries such as the mock hospital.
pub fn init_simple_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_hospital=info,patient_lookup=info".into()),
        )
        .with(fmt::layer())
        .init();
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        shutdown_telemetry();
    }
}
