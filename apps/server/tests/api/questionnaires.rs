//! Questionnaire tests

use crate::support::{assert_diagnostics, assert_status, consent_questionnaire, TestApp};
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn create_then_read_rebuilds_the_tree() -> anyhow::Result<()> {
    let app = TestApp::new();

    let (status, created) = app
        .json(Method::POST, "/rdr/v1/Questionnaire", Some(&consent_questionnaire()))
        .await?;
    assert_status(status, StatusCode::OK, "create");
    let id = created["id"].as_str().expect("assigned id").to_string();
    assert_eq!(created["publisher"], "PMI");
    assert_eq!(created["group"]["linkId"], "root");
    assert_eq!(created["group"]["group"][0]["linkId"], "name");
    assert_eq!(created["group"]["group"][0]["question"][1]["linkId"], "last");
    assert_eq!(
        created["group"]["group"][1]["question"][0]["group"][0]["question"][0]["linkId"],
        "email"
    );

    let (status, read) = app
        .json(Method::GET, &format!("/rdr/v1/Questionnaire/{id}"), None)
        .await?;
    assert_status(status, StatusCode::OK, "read");
    assert_eq!(read, created);
    Ok(())
}

#[tokio::test]
async fn single_element_group_array_is_accepted() -> anyhow::Result<()> {
    let app = TestApp::new();
    let mut questionnaire = consent_questionnaire();
    questionnaire["group"] = json!([questionnaire["group"].clone()]);

    let (status, created) = app
        .json(Method::POST, "/rdr/v1/Questionnaire", Some(&questionnaire))
        .await?;
    assert_status(status, StatusCode::OK, "create");
    assert_eq!(created["group"]["linkId"], "root");
    Ok(())
}

#[tokio::test]
async fn multiple_root_groups_are_rejected() -> anyhow::Result<()> {
    let app = TestApp::new();
    let mut questionnaire = consent_questionnaire();
    questionnaire["group"] = json!([{"linkId": "a"}, {"linkId": "b"}]);

    let (status, outcome) = app
        .json(Method::POST, "/rdr/v1/Questionnaire", Some(&questionnaire))
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "two roots");
    assert_diagnostics(&outcome, "Questionnaire may only have one root group");
    Ok(())
}

#[tokio::test]
async fn unknown_questionnaire_is_not_found() -> anyhow::Result<()> {
    let app = TestApp::new();
    let (status, _) = app
        .json(Method::GET, "/rdr/v1/Questionnaire/does-not-exist", None)
        .await?;
    assert_status(status, StatusCode::NOT_FOUND, "unknown questionnaire");
    Ok(())
}
