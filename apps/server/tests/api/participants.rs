//! Participant and participant summary tests
//!
//! Tests cover:
//! - Create and read with version ETags
//! - Updates guarded by If-Match
//! - Pairing through the provider link
//! - Withdrawal blocking further writes
//! - Enrollment status derived from summary inputs

use crate::support::{assert_diagnostics, assert_status, to_json_body, with_test_app, TestApp};
use axum::http::{header, Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn create_and_read_participant() -> anyhow::Result<()> {
    let app = TestApp::new();

    let (status, headers, body) = app
        .request(Method::POST, "/rdr/v1/Participant", Some(to_json_body(&json!({}))?))
        .await?;
    assert_status(status, StatusCode::OK, "create");
    assert_eq!(headers.get(header::ETAG).unwrap(), "W/\"1\"");

    let created: serde_json::Value = serde_json::from_slice(&body)?;
    let pid = created["participantId"].as_str().unwrap();
    assert!(pid.starts_with('P') && pid.len() == 10);
    assert!(created["biobankId"].as_str().unwrap().starts_with('B'));
    assert_eq!(created["hpoId"], 0);
    assert_eq!(created["withdrawalStatus"], "NOT_WITHDRAWN");

    let (status, read) = app
        .json(Method::GET, &format!("/rdr/v1/Participant/{pid}"), None)
        .await?;
    assert_status(status, StatusCode::OK, "read");
    assert_eq!(read, created);
    Ok(())
}

#[tokio::test]
async fn read_unknown_or_malformed_participant() -> anyhow::Result<()> {
    let app = TestApp::new();

    let (status, _) = app.json(Method::GET, "/rdr/v1/Participant/P123456789", None).await?;
    assert_status(status, StatusCode::NOT_FOUND, "unknown participant");

    let (status, outcome) = app.json(Method::GET, "/rdr/v1/Participant/123", None).await?;
    assert_status(status, StatusCode::BAD_REQUEST, "missing P prefix");
    assert_diagnostics(&outcome, "Invalid participant ID: 123");
    Ok(())
}

#[tokio::test]
async fn update_requires_matching_version() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (_, created) = app
                .json(Method::POST, "/rdr/v1/Participant", Some(&json!({})))
                .await?;
            let path = format!("/rdr/v1/Participant/{}", created["participantId"].as_str().unwrap());
            let link = json!({"providerLink": [{"primary": true, "organization": {"reference": "Organization/PITT"}}]});

            let (status, _, _) = app
                .request(Method::PUT, &path, Some(to_json_body(&link)?))
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "missing If-Match");

            let (status, _, _) = app
                .request_with_extra_headers(Method::PUT, &path, Some(to_json_body(&link)?), &[("if-match", "W/\"5\"")])
                .await?;
            assert_status(status, StatusCode::PRECONDITION_FAILED, "stale If-Match");

            let (status, headers, body) = app
                .request_with_extra_headers(Method::PUT, &path, Some(to_json_body(&link)?), &[("if-match", "W/\"1\"")])
                .await?;
            assert_status(status, StatusCode::OK, "update");
            assert_eq!(headers.get(header::ETAG).unwrap(), "W/\"2\"");
            let updated: serde_json::Value = serde_json::from_slice(&body)?;
            assert_eq!(updated["hpoId"], 1);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn provider_link_to_unknown_awardee_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new();
    let body = json!({"providerLink": [{"primary": true, "organization": {"reference": "Organization/NOWHERE"}}]});

    let (status, outcome) = app.json(Method::POST, "/rdr/v1/Participant", Some(&body)).await?;
    assert_status(status, StatusCode::BAD_REQUEST, "unknown awardee");
    assert_diagnostics(&outcome, "No awardee found with name NOWHERE");
    Ok(())
}

#[tokio::test]
async fn withdrawn_participant_cannot_be_updated() -> anyhow::Result<()> {
    let app = TestApp::new();
    let pid = app.consented_participant().await?;
    let path = format!("/rdr/v1/Participant/{pid}");

    let withdraw = json!({"withdrawalStatus": "NO_USE"});
    let (status, _, body) = app
        .request_with_extra_headers(Method::PUT, &path, Some(to_json_body(&withdraw)?), &[("if-match", "W/\"1\"")])
        .await?;
    assert_status(status, StatusCode::OK, "withdraw");
    let withdrawn: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(withdrawn["withdrawalStatus"], "NO_USE");

    let (_, summary) = app.json(Method::GET, &format!("{path}/Summary"), None).await?;
    assert_eq!(summary["withdrawalStatus"], "NO_USE");

    let (status, _, _) = app
        .request_with_extra_headers(Method::PUT, &path, Some(to_json_body(&json!({}))?), &[("if-match", "W/\"2\"")])
        .await?;
    assert_status(status, StatusCode::FORBIDDEN, "update after withdrawal");
    Ok(())
}

#[tokio::test]
async fn summary_tracks_enrollment_status() -> anyhow::Result<()> {
    let app = TestApp::new();
    let (_, created) = app
        .json(Method::POST, "/rdr/v1/Participant", Some(&json!({})))
        .await?;
    let pid = created["participantId"].as_str().unwrap();
    let path = format!("/rdr/v1/Participant/{pid}/Summary");

    let (status, _) = app.json(Method::GET, &path, None).await?;
    assert_status(status, StatusCode::NOT_FOUND, "no summary before consent");

    let (status, summary) = app
        .json(Method::PUT, &path, Some(&json!({"consentForStudyEnrollment": "SUBMITTED"})))
        .await?;
    assert_status(status, StatusCode::OK, "first consent");
    assert_eq!(summary["participantId"], pid);
    assert_eq!(summary["enrollmentStatus"], "INTERESTED");

    let (_, summary) = app
        .json(Method::PUT, &path, Some(&json!({"consentForElectronicHealthRecords": "SUBMITTED"})))
        .await?;
    assert_eq!(summary["enrollmentStatus"], "MEMBER");
    assert_eq!(summary["consentForStudyEnrollment"], "SUBMITTED");

    let (status, outcome) = app
        .json(Method::PUT, &path, Some(&json!({"biospecimenCollectedSiteId": 999})))
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "unknown biospecimen site");
    assert_diagnostics(&outcome, "Invalid siteId reference 999");
    Ok(())
}
