//! Stand-in for the upstream hospital API, for local development and demos.

use anyhow::Context;
use clap::Parser;
use patient_lookup::{adapter::mock, logging};

#[derive(Debug, Parser)]
#[clap(name = "mock-hospital", about = "Serve canned hospital patient records")]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    host: String,

    #[clap(short, long, default_value = "9090", env = "MOCK_HOSPITAL_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_simple_logging();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    tracing::info!("Mock hospital listening on http://{}", addr);

    axum::serve(listener, mock::router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Mock hospital server failed")?;

    Ok(())
}
