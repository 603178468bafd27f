//! Awardee hierarchy and service endpoint tests

use crate::support::{assert_searchset, assert_status, bundle_resources, with_test_app, TestApp, FINALIZED_SITE};
use axum::http::{Method, StatusCode};

#[tokio::test]
async fn lists_awardees_with_nested_sites() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, bundle) = app.json(Method::GET, "/rdr/v1/Awardee", None).await?;
            assert_status(status, StatusCode::OK, "list");
            assert_searchset(&bundle)?;

            let awardees = bundle_resources(&bundle)?;
            assert_eq!(awardees.len(), 1, "UNSET awardee is not listed");
            let pitt = awardees[0];
            assert_eq!(pitt["id"], "PITT");
            assert_eq!(pitt["type"], "HPO");
            assert_eq!(pitt["organizations"][0]["id"], "PITT_UPMC");
            let sites = pitt["organizations"][0]["sites"].as_array().expect("sites");
            assert_eq!(sites.len(), 2);
            assert!(sites.iter().any(|s| s["id"] == FINALIZED_SITE));
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn reads_awardee_by_name() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, pitt) = app.json(Method::GET, "/rdr/v1/Awardee/PITT", None).await?;
            assert_status(status, StatusCode::OK, "read");
            assert_eq!(pitt["displayName"], "Pittsburgh");

            let (status, _) = app.json(Method::GET, "/rdr/v1/Awardee/NOWHERE", None).await?;
            assert_status(status, StatusCode::NOT_FOUND, "unknown awardee");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn health_and_metrics_respond() -> anyhow::Result<()> {
    let app = TestApp::new();

    let (status, _, _) = app.request(Method::GET, "/health", None).await?;
    assert_status(status, StatusCode::OK, "health");

    let (status, _, body) = app.request(Method::GET, "/metrics", None).await?;
    assert_status(status, StatusCode::OK, "metrics");
    assert!(std::str::from_utf8(&body)?.contains("http_requests_total"));
    Ok(())
}
