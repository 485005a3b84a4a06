//! Patient lookup service - HTTP server entry point

use anyhow::Context;
use clap::Parser;
use patient_lookup::{api::create_router, config::Config, logging, state::AppState};

#[derive(Debug, Parser)]
#[clap(name = "patient-lookup-server", version, about = "Patient identity lookup service")]
struct Args {
    /// Configuration file (without extension); defaults to $PATIENT_LOOKUP_CONFIG or `config`
    #[clap(short, long)]
    config: Option<String>,

    /// Override `server.port`
    #[clap(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration first to get logging settings
    let mut config =
        Config::load_from(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _telemetry_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging/telemetry")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.logging.deployment_environment,
        "Starting patient lookup service"
    );

    let addr = config
        .socket_addr()
        .context("Failed to determine socket address")?;

    tracing::info!(
        listen_addr = %addr,
        hospital_source = %config.hospital.base_url,
        persistent = config.database.url.is_some(),
        "Configuration loaded"
    );

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let app = create_router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server terminated unexpectedly");
        logging::shutdown_telemetry();
        return Err(e.into());
    }

    tracing::info!("Server shutdown complete");
    logging::shutdown_telemetry();

    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler; waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
