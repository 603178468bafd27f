use axum::{
    extract::{Path, Query, State},
    Json,
};
use rdr_fhir_models::Bundle;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    api::{extractors::{JsonBody, ParticipantId}, API_PREFIX},
    models::{parse_participant_id, PhysicalMeasurements},
    state::AppState,
    Error, Result,
};

fn parse_record_id(id: &str) -> Result<i64> {
    id.parse()
        .map_err(|_| Error::NotFound(format!("PhysicalMeasurements {id} not found")))
}

fn searchset(records: &[PhysicalMeasurements], next_url: Option<String>) -> Result<JsonValue> {
    let resources = records.iter().map(PhysicalMeasurements::to_client_json).collect();
    Ok(Bundle::searchset(resources, next_url).to_value()?)
}

pub async fn insert_physical_measurements(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
    JsonBody(body): JsonBody,
) -> Result<Json<JsonValue>> {
    let record = state
        .physical_measurements_service
        .insert(participant_id, body)
        .await?;
    Ok(Json(record.to_client_json()))
}

pub async fn list_physical_measurements(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
) -> Result<Json<JsonValue>> {
    let records = state
        .physical_measurements_service
        .list_for_participant(participant_id)
        .await?;
    Ok(Json(searchset(&records, None)?))
}

pub async fn read_physical_measurements(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>> {
    let record = state
        .physical_measurements_service
        .get(parse_participant_id(&pid)?, parse_record_id(&id)?)
        .await?;
    Ok(Json(record.to_client_json()))
}

/// Cancel or restore
pub async fn patch_physical_measurements(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, String)>,
    JsonBody(body): JsonBody,
) -> Result<Json<JsonValue>> {
    let record = state
        .physical_measurements_service
        .patch(parse_participant_id(&pid)?, parse_record_id(&id)?, &body)
        .await?;
    Ok(Json(record.to_client_json()))
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "_count")]
    pub count: Option<usize>,
    #[serde(rename = "_token")]
    pub token: Option<String>,
}

/// Every participant's records in log order, paged with an opaque `_token`
pub async fn sync_physical_measurements(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<JsonValue>> {
    let page = state
        .physical_measurements_service
        .sync(query.count, query.token.as_deref())
        .await?;
    let count = query.count.unwrap_or(state.config.sync.default_page_size);
    let next_url = page.next_token.map(|token| {
        format!("{API_PREFIX}/PhysicalMeasurements/_history?_count={count}&_token={token}")
    });
    Ok(Json(searchset(&page.records, next_url)?))
}
