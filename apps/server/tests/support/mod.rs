#![allow(dead_code)]

pub mod assertions;
pub mod builders;
pub mod fixtures;

use anyhow::Context as _;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use rdr::{
    api::create_router,
    clock::FixedClock,
    db::{MemoryStore, Store},
    models::{Hpo, Organization, OrganizationType, Site, SiteStatus},
    AppState, Config,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt as _;

// Re-export commonly used items
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::new_with_config(|_| {})
    }

    /// In-memory store and a clock fixed at 2018-03-01T12:00:00Z
    pub fn new_with_config(configure: impl FnOnce(&mut Config)) -> Self {
        init_tracing();
        let mut config = Config::default();
        configure(&mut config);

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2018, 3, 1, 12, 0, 0).unwrap(),
        ));
        Self::with_store(config, Arc::new(MemoryStore::new()), clock)
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>, clock: Arc<FixedClock>) -> Self {
        let state = AppState::with_store(config, store, clock.clone());
        let router = create_router(state.clone());
        Self {
            router,
            state,
            clock,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        self.request_with_extra_headers(method, path_and_query, body, &[])
            .await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let mut request = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("host", "example.org")
            .header("content-type", "application/json")
            .body(match body {
                Some(bytes) => Body::from(bytes),
                None => Body::empty(),
            })
            .context("build request")?;

        for (name, value) in extra_headers {
            request.headers_mut().insert(
                name.parse::<HeaderName>().context("parse header name")?,
                value.parse::<HeaderValue>().context("parse header value")?,
            );
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        Ok((status, headers, body))
    }

    /// Send JSON and parse the JSON response
    pub async fn json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let body = body.map(to_json_body).transpose()?;
        let (status, _headers, bytes) = self.request(method, path, body).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("parse response JSON")?
        };
        Ok((status, value))
    }

    /// A new participant with both consents submitted, so measurements are accepted
    pub async fn consented_participant(&self) -> anyhow::Result<String> {
        let (status, participant) = self
            .json(Method::POST, "/rdr/v1/Participant", Some(&json!({})))
            .await?;
        assert_status(status, StatusCode::OK, "create participant");
        let pid = participant["participantId"]
            .as_str()
            .context("participantId")?
            .to_string();

        let (status, _) = self
            .json(
                Method::PUT,
                &format!("/rdr/v1/Participant/{pid}/Summary"),
                Some(&json!({
                    "consentForStudyEnrollment": "SUBMITTED",
                    "consentForElectronicHealthRecords": "SUBMITTED"
                })),
            )
            .await?;
        assert_status(status, StatusCode::OK, "consent participant");
        Ok(pid)
    }

    /// Awardee PITT with organization PITT_UPMC and the two sites the fixtures refer to
    pub async fn seed_reference_data(&self) -> anyhow::Result<()> {
        let mut tx = self.state.store.begin().await?;
        tx.insert_hpo(&Hpo {
            hpo_id: 1,
            name: "PITT".to_string(),
            display_name: "Pittsburgh".to_string(),
            organization_type: Some(OrganizationType::Hpo),
        })
        .await?;
        let organization_id = tx
            .insert_organization(&Organization {
                organization_id: 0,
                external_id: "PITT_UPMC".to_string(),
                display_name: "UPMC".to_string(),
                hpo_id: 1,
            })
            .await?;
        for (name, google_group) in [
            ("Monroeville", fixtures::CREATED_SITE),
            ("Banner Phoenix", fixtures::FINALIZED_SITE),
        ] {
            tx.insert_site(&Site {
                site_name: name.to_string(),
                google_group: google_group.to_string(),
                mayolink_client_number: Some(7035769),
                organization_id: Some(organization_id),
                hpo_id: Some(1),
                site_status: Some(SiteStatus::Active),
                ..Default::default()
            })
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn site_id(&self, google_group: &str) -> anyhow::Result<i64> {
        let mut tx = self.state.store.begin().await?;
        let site = tx
            .get_site_by_google_group(google_group)
            .await?
            .context("seeded site")?;
        tx.rollback().await?;
        Ok(site.site_id)
    }
}

pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a TestApp,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    let app = TestApp::new();
    app.seed_reference_data().await?;
    f(&app).await
}

fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "rdr=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
