//! Physical measurements sync feed tests

use crate::support::{
    assert_diagnostics, assert_searchset, assert_status, bundle_ids, intake_document, next_link,
    with_test_app, DocumentBuilder, TestApp, CREATED_SITE,
};
use axum::http::{Method, StatusCode};
use rdr::models::parse_participant_id;

#[tokio::test]
async fn pages_through_every_participant_in_log_order() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let mut inserted = Vec::new();
            for weight in [60.0, 61.0, 62.0] {
                let pid = app.consented_participant().await?;
                let document = DocumentBuilder::new()
                    .created_at(CREATED_SITE)
                    .quantity("urn:example:weight", "29463-7", weight, "kg")
                    .build();
                let (status, record) = app
                    .json(
                        Method::POST,
                        &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"),
                        Some(&document),
                    )
                    .await?;
                assert_status(status, StatusCode::OK, "insert");
                inserted.push(record["id"].as_str().unwrap_or_default().to_string());
            }

            let (status, first_page) = app
                .json(Method::GET, "/rdr/v1/PhysicalMeasurements/_history?_count=2", None)
                .await?;
            assert_status(status, StatusCode::OK, "first page");
            assert_searchset(&first_page)?;
            assert_eq!(bundle_ids(&first_page)?, inserted[..2].to_vec());

            let next = next_link(&first_page).expect("next link on a full page");
            let parsed = url::Url::parse(&format!("http://example.org{next}"))?;
            assert_eq!(parsed.path(), "/rdr/v1/PhysicalMeasurements/_history");
            let query: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
            assert_eq!(query[0], ("_count".to_string(), "2".to_string()));
            assert_eq!(query[1].0, "_token");

            let (status, second_page) = app.json(Method::GET, &next, None).await?;
            assert_status(status, StatusCode::OK, "second page");
            assert_eq!(bundle_ids(&second_page)?, inserted[2..].to_vec());
            assert!(next_link(&second_page).is_none());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn empty_feed_has_no_entries() -> anyhow::Result<()> {
    let app = TestApp::new();
    let (status, bundle) = app
        .json(Method::GET, "/rdr/v1/PhysicalMeasurements/_history", None)
        .await?;
    assert_status(status, StatusCode::OK, "empty feed");
    assert!(bundle_ids(&bundle)?.is_empty());
    assert!(next_link(&bundle).is_none());
    Ok(())
}

#[tokio::test]
async fn feed_includes_withdrawn_participants() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let pid = app.consented_participant().await?;
            app.json(
                Method::POST,
                &format!("/rdr/v1/Participant/{pid}/PhysicalMeasurements"),
                Some(&intake_document()),
            )
            .await?;
            app.state
                .participant_service
                .withdraw(parse_participant_id(&pid)?, 2)
                .await?;

            let (_, bundle) = app
                .json(Method::GET, "/rdr/v1/PhysicalMeasurements/_history", None)
                .await?;
            assert_eq!(bundle_ids(&bundle)?.len(), 1);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn rejects_bad_paging_parameters() -> anyhow::Result<()> {
    let app = TestApp::new();

    let (status, outcome) = app
        .json(Method::GET, "/rdr/v1/PhysicalMeasurements/_history?_count=0", None)
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "zero count");
    assert_diagnostics(&outcome, "_count must be between 1 and 10000");

    let (status, outcome) = app
        .json(Method::GET, "/rdr/v1/PhysicalMeasurements/_history?_token=garbage", None)
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "invalid token");
    assert_diagnostics(&outcome, "Invalid continuation token: garbage");
    Ok(())
}
