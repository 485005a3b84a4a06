//! HTTP hospital client against the bundled mock hospital.

#![allow(unused)]
mod support;

use axum::http::StatusCode;
use patient_lookup::{
    adapter::{mock, AdapterError, HospitalHttpClient, HospitalSource},
    config::HospitalConfig,
};
use std::{net::SocketAddr, sync::Arc};
use support::{assert_status, test_config, ScriptedSource, TestApp};

async fn spawn_mock_hospital() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, mock::router()).await;
    });
    Ok(addr)
}

fn client(addr: SocketAddr, timeout_ms: u64) -> HospitalHttpClient {
    HospitalHttpClient::new(&HospitalConfig {
        base_url: format!("http://{addr}"),
        timeout_ms,
    })
    .unwrap()
}

#[tokio::test]
async fn known_identifier_is_decoded() -> anyhow::Result<()> {
    let addr = spawn_mock_hospital().await?;
    let record = client(addr, 2000)
        .lookup("1100000000001")
        .await?
        .expect("mock hospital knows every plain identifier");

    assert_eq!(record.national_id.as_deref(), Some("1100000000001"));
    assert_eq!(record.first_name_en.as_deref(), Some("Manop"));
    assert_eq!(record.first_name_th.as_deref(), Some("มานพ"));
    assert_eq!(record.date_of_birth, chrono::NaiveDate::from_ymd_opt(1985, 5, 5));
    // Blank upstream fields come back as absent.
    assert_eq!(record.passport_id, None);
    assert_eq!(record.middle_name_en, None);
    // Scope and identity are assigned by the resolver, not the adapter.
    assert_eq!(record.id, None);
    assert_eq!(record.hospital_id, None);
    assert!(record.raw_payload.is_some_and(|raw| !raw.is_empty()));
    Ok(())
}

#[tokio::test]
async fn remote_not_found_is_absence() -> anyhow::Result<()> {
    let addr = spawn_mock_hospital().await?;
    assert!(client(addr, 2000).lookup("UNKNOWN-1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn remote_error_status_is_an_error() -> anyhow::Result<()> {
    let addr = spawn_mock_hospital().await?;
    let err = client(addr, 2000).lookup("FAIL-1").await.unwrap_err();
    assert!(matches!(err, AdapterError::Status { status: 503, .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn slow_remote_times_out() -> anyhow::Result<()> {
    let addr = spawn_mock_hospital().await?;
    let err = client(addr, 200).lookup("SLOW-1").await.unwrap_err();
    assert!(matches!(err, AdapterError::Timeout), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn unreachable_remote_is_a_transport_error() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let err = client(addr, 2000).lookup("1").await.unwrap_err();
    assert!(
        matches!(err, AdapterError::Transport(_) | AdapterError::Timeout),
        "got {err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn resolve_end_to_end_through_mock_hospital() -> anyhow::Result<()> {
    let addr = spawn_mock_hospital().await?;
    let config = test_config(|c| c.hospital.base_url = format!("http://{addr}"));
    let source = Arc::new(HospitalHttpClient::new(&config.hospital)?);
    let app = TestApp::with_source(config, source, Arc::new(ScriptedSource::default()))?;
    let token = app.token("staff-1", "H1");

    let (status, _, body) = app.get("/v1/patient/2200000000002", Some(&token)).await?;
    assert_status(status, StatusCode::OK, "resolve via mock");
    assert_eq!(body["national_id"], "2200000000002");
    assert_eq!(body["hospital_id"], "H1");
    assert_eq!(body["patient_hn"], "HN-999");

    let (status, _, _) = app.get("/v1/patient/UNKNOWN-7", Some(&token)).await?;
    assert_status(status, StatusCode::NOT_FOUND, "unknown upstream");

    let (status, _, _) = app.get("/v1/patient/FAIL-7", Some(&token)).await?;
    assert_status(status, StatusCode::INTERNAL_SERVER_ERROR, "failing upstream");

    assert_eq!(app.store.len().await, 1);
    Ok(())
}
