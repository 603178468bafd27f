//! Physical measurements tests
//!
//! Tests cover:
//! - Insert, read and list per participant
//! - Summary rollup and participant pairing from the finalized site
//! - Backfill of derived columns
//! - Duplicate submissions
//! - Amendments
//! - Cancel and restore
//! - Withdrawn and unknown participants

use crate::support::{
    assert_diagnostics, assert_searchset, assert_status, blood_pressure_document, bundle_ids,
    constants, intake_document, patch_body, to_json_body, with_test_app, DocumentBuilder, TestApp,
    CREATED_SITE, CREATOR, FINALIZED_SITE,
};
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

async fn insert(app: &TestApp, pid: &str, document: &Value) -> anyhow::Result<(StatusCode, Value)> {
    app.json(
        Method::POST,
        &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"),
        Some(document),
    )
    .await
}

fn record_id(record: &Value) -> String {
    record["id"].as_str().expect("record id").to_string()
}

#[tokio::test]
async fn insert_read_and_list() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;

            let (status, record) = insert(app, &pid, &intake_document()).await?;
            assert_status(status, StatusCode::OK, "insert");
            let id = record_id(&record);
            assert_eq!(id.len(), 9);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(record["entry"].as_array().map(Vec::len), Some(3));

            let (status, read) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements/{id}"), None)
                .await?;
            assert_status(status, StatusCode::OK, "read");
            assert_eq!(read, record);

            let (status, bundle) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"), None)
                .await?;
            assert_status(status, StatusCode::OK, "list");
            assert_searchset(&bundle)?;
            assert_eq!(bundle_ids(&bundle)?, vec![id]);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn unknown_record_id_is_not_found() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            for id in ["123456789", "not-a-number"] {
                let (status, _) = app
                    .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements/{id}"), None)
                    .await?;
                assert_status(status, StatusCode::NOT_FOUND, id);
            }
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn insert_rolls_up_summary_and_pairs_participant() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            insert(app, &pid, &intake_document()).await?;

            let created_site = app.site_id(CREATED_SITE).await?;
            let finalized_site = app.site_id(FINALIZED_SITE).await?;

            let (_, summary) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/Summary"), None)
                .await?;
            assert_eq!(summary["physicalMeasurementsStatus"], "COMPLETED");
            assert_eq!(summary["physicalMeasurementsCreatedSiteId"], created_site);
            assert_eq!(summary["physicalMeasurementsFinalizedSiteId"], finalized_site);
            assert_eq!(summary["enrollmentStatus"], "MEMBER");
            assert_eq!(summary["hpoId"], 1);

            let (_, participant) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}"), None)
                .await?;
            assert_eq!(participant["hpoId"], 1);
            assert_eq!(participant["siteId"], finalized_site);
            assert_eq!(participant["meta"]["versionId"], "W/\"2\"");
            assert_eq!(
                participant["providerLink"][0]["organization"]["reference"],
                "Organization/PITT"
            );
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn completing_every_input_makes_full_participant() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let summary_path = format!("/rdr/v1/Participant/{pid}/Summary");
            app.json(
                Method::PUT,
                &summary_path,
                Some(&json!({"numCompletedBaselinePPIModules": 3, "samplesToIsolateDNA": "RECEIVED"})),
            )
            .await?;

            let (_, summary) = app.json(Method::GET, &summary_path, None).await?;
            assert_eq!(summary["enrollmentStatus"], "MEMBER");

            insert(app, &pid, &intake_document()).await?;
            let (_, summary) = app.json(Method::GET, &summary_path, None).await?;
            assert_eq!(summary["enrollmentStatus"], "FULL_PARTICIPANT");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn duplicate_submission_returns_stored_record() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let (_, first) = insert(app, &pid, &intake_document()).await?;
            let (status, second) = insert(app, &pid, &intake_document()).await?;
            assert_status(status, StatusCode::OK, "duplicate insert");
            assert_eq!(record_id(&first), record_id(&second));

            let (_, bundle) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"), None)
                .await?;
            assert_eq!(bundle_ids(&bundle)?.len(), 1);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn amendment_marks_original_amended() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let (_, original) = insert(app, &pid, &intake_document()).await?;
            let original_id = record_id(&original);

            let amendment = DocumentBuilder::new()
                .created_at(CREATED_SITE)
                .finalized_at(FINALIZED_SITE)
                .amends(original_id.clone())
                .quantity("urn:example:height", "8302-2", 168.0, "cm")
                .build();
            let (status, amended) = insert(app, &pid, &amendment).await?;
            assert_status(status, StatusCode::OK, "amendment");
            assert_ne!(record_id(&amended), original_id);

            let (_, original) = app
                .json(
                    Method::GET,
                    &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements/{original_id}"),
                    None,
                )
                .await?;
            assert_eq!(original["entry"][0]["resource"]["status"], "amended");
            assert_eq!(amended["entry"][0]["resource"]["extension"][2]["url"], constants::AMENDMENT_URL);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn amendment_of_unknown_record_is_rejected() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let document = DocumentBuilder::new()
                .amends("123456789")
                .quantity("urn:example:height", "8302-2", 168.0, "cm")
                .build();
            let (status, outcome) = insert(app, &pid, &document).await?;
            assert_status(status, StatusCode::BAD_REQUEST, "unknown amendment");
            assert_diagnostics(
                &outcome,
                "Amendment references unknown PhysicalMeasurement '123456789'.",
            );
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn cancel_and_restore() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let (_, record) = insert(app, &pid, &intake_document()).await?;
            let path = format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements/{}", record_id(&record));
            let summary_path = format!("/rdr/v1/Participant/{pid}/Summary");

            let (status, cancelled) = app
                .json(Method::PATCH, &path, Some(&patch_body("cancelled", "mike@pmi-ops.org", CREATED_SITE)))
                .await?;
            assert_status(status, StatusCode::OK, "cancel");
            assert_eq!(cancelled["status"], "CANCELLED");
            assert_eq!(cancelled["cancelledUsername"], "mike@pmi-ops.org");
            assert_eq!(cancelled["cancelledSiteId"], app.site_id(CREATED_SITE).await?);
            let (_, summary) = app.json(Method::GET, &summary_path, None).await?;
            assert_eq!(summary["physicalMeasurementsStatus"], "CANCELLED");

            let (status, outcome) = app
                .json(Method::PATCH, &path, Some(&patch_body("cancelled", "mike@pmi-ops.org", CREATED_SITE)))
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "second cancel");
            assert_diagnostics(&outcome, "This order is already cancelled");

            let (status, restored) = app
                .json(Method::PATCH, &path, Some(&patch_body("restored", "ann@pmi-ops.org", FINALIZED_SITE)))
                .await?;
            assert_status(status, StatusCode::OK, "restore");
            assert_eq!(restored["status"], "RESTORED");
            assert!(restored.get("cancelledUsername").is_none());
            let (_, summary) = app.json(Method::GET, &summary_path, None).await?;
            assert_eq!(summary["physicalMeasurementsStatus"], "COMPLETED");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn patch_of_another_participants_record_is_not_found() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let owner = app.consented_participant().await?;
            let other = app.consented_participant().await?;
            let (_, record) = insert(app, &owner, &intake_document()).await?;

            let (status, _) = app
                .json(
                    Method::PATCH,
                    &format!("/rdr/v1/Participant/{other}/PhysicalMeasurements/{}", record_id(&record)),
                    Some(&patch_body("cancelled", "mike@pmi-ops.org", CREATED_SITE)),
                )
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "foreign record");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn unknown_participant_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new();
    let (status, outcome) = insert(&app, "P123456789", &intake_document()).await?;
    assert_status(status, StatusCode::BAD_REQUEST, "unknown participant");
    assert_diagnostics(
        &outcome,
        "Can't submit physical measurements for unknown participant P123456789",
    );
    Ok(())
}

#[tokio::test]
async fn empty_document_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new();
    let pid = app.consented_participant().await?;
    let (status, outcome) = insert(&app, &pid, &json!({"resourceType": "Bundle", "entry": []})).await?;
    assert_status(status, StatusCode::BAD_REQUEST, "no entries");
    assert_diagnostics(&outcome, "Physical measurements document has no entries");
    Ok(())
}

#[tokio::test]
async fn withdrawn_participant_is_forbidden() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            insert(app, &pid, &intake_document()).await?;

            let (status, _, _) = app
                .request_with_extra_headers(
                    Method::PUT,
                    &format!("/rdr/v1/Participant/{pid}"),
                    Some(to_json_body(&json!({"withdrawalStatus": "NO_USE"}))?),
                    &[("if-match", "W/\"2\"")],
                )
                .await?;
            assert_status(status, StatusCode::OK, "withdraw");

            let (status, _) = insert(app, &pid, &blood_pressure_document()).await?;
            assert_status(status, StatusCode::FORBIDDEN, "insert after withdrawal");

            let (status, _) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"), None)
                .await?;
            assert_status(status, StatusCode::FORBIDDEN, "list after withdrawal");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn distinct_measurements_and_backfill() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            insert(app, &pid, &blood_pressure_document()).await?;
            insert(app, &pid, &intake_document()).await?;

            let service = &app.state.physical_measurements_service;
            let distinct = service.distinct_measurements_json().await?;
            let blood_pressure = distinct
                .iter()
                .find(|m| m["code"]["code"] == "55284-4")
                .expect("blood pressure in catalogue");
            assert_eq!(blood_pressure["submeasurements"].as_array().map(Vec::len), Some(2));
            assert_eq!(blood_pressure["qualifiers"][0]["code"], "heart-rhythm-status");
            assert_eq!(blood_pressure["bodySites"][0]["code"], "368209003");
            assert!(distinct.iter().all(|m| m["code"]["code"] != "8480-6"));

            assert_eq!(service.backfill().await?, 2);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn biospecimen_site_keeps_participant_unpaired() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let biospecimen_site = app.site_id(CREATED_SITE).await?;
            let (status, _) = app
                .json(
                    Method::PUT,
                    &format!("/rdr/v1/Participant/{pid}/Summary"),
                    Some(&json!({"biospecimenCollectedSiteId": biospecimen_site})),
                )
                .await?;
            assert_status(status, StatusCode::OK, "set biospecimen site");

            let (status, _) = insert(app, &pid, &intake_document()).await?;
            assert_status(status, StatusCode::OK, "insert");

            let (_, participant) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}"), None)
                .await?;
            assert_eq!(participant["hpoId"], 0);
            assert!(participant.get("siteId").is_none());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn amendment_does_not_pair_participant() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let original = DocumentBuilder::new()
                .created_at(CREATED_SITE)
                .quantity("urn:example:height", "8302-2", 167.3, "cm")
                .build();
            let (status, original) = insert(app, &pid, &original).await?;
            assert_status(status, StatusCode::OK, "original");

            let amendment = DocumentBuilder::new()
                .created_at(CREATED_SITE)
                .finalized_at(FINALIZED_SITE)
                .amends(record_id(&original))
                .quantity("urn:example:height", "8302-2", 168.0, "cm")
                .build();
            let (status, _) = insert(app, &pid, &amendment).await?;
            assert_status(status, StatusCode::OK, "amendment");

            let (_, participant) = app
                .json(Method::GET, &format!("/rdr/v1/Participant/{pid}"), None)
                .await?;
            assert_eq!(participant["hpoId"], 0);
            assert!(participant.get("siteId").is_none());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn oversized_component_notes_are_rejected() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let document = DocumentBuilder::new()
                .created_at(CREATED_SITE)
                .observation(json!({
                    "fullUrl": "urn:example:waist",
                    "resource": {
                        "resourceType": "Observation",
                        "effectiveDateTime": "2018-03-01T06:40:00-05:00",
                        "code": {"coding": [{"system": constants::PMI_SYSTEM, "code": "waist-circumference"}]},
                        "component": [{
                            "code": {"coding": [{"system": constants::PMI_SYSTEM, "code": "notes"}]},
                            "valueString": "x".repeat(65_536)
                        }]
                    }
                }))
                .build();

            let (status, outcome) = insert(app, &pid, &document).await?;
            assert_status(status, StatusCode::BAD_REQUEST, "oversized component notes");
            assert_diagnostics(&outcome, "Component notes field exceeds limit.");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn backfill_restores_derived_columns() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            let (_, record) = insert(app, &pid, &intake_document()).await?;
            let id: i64 = record_id(&record).parse()?;

            let mut tx = app.state.store.begin().await?;
            let mut stored = tx
                .get_physical_measurements(id, true)
                .await?
                .expect("stored record");
            stored.created_username = None;
            stored.created_site_id = None;
            stored.measurements.clear();
            tx.update_physical_measurements(&stored).await?;
            tx.replace_measurements(&stored).await?;
            tx.commit().await?;

            assert_eq!(app.state.physical_measurements_service.backfill().await?, 1);

            let mut tx = app.state.store.begin().await?;
            let stored = tx
                .get_physical_measurements(id, false)
                .await?
                .expect("stored record");
            tx.rollback().await?;
            assert_eq!(stored.created_username.as_deref(), Some(CREATOR));
            assert_eq!(stored.created_site_id, Some(app.site_id(CREATED_SITE).await?));
            assert_eq!(stored.measurements.len(), 2);
            assert!(stored.measurements.iter().all(|m| m.measurement_id != 0));
            Ok(())
        })
    })
    .await
}
