use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{
    api::{
        extractors::{JsonBody, ParticipantId},
        headers::{etag_headers, require_if_match},
    },
    models::{Participant, ParticipantInput, SummaryUpdate},
    state::AppState,
    Error, Result,
};

pub(crate) fn parse_body<T: DeserializeOwned>(body: JsonValue) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::BadRequest(format!("Invalid request body: {e}")))
}

fn participant_response(participant: &Participant) -> Response {
    (
        etag_headers(participant.version),
        Json(participant.to_client_json()),
    )
        .into_response()
}

pub async fn create_participant(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Response> {
    let input: ParticipantInput = parse_body(body)?;
    let participant = state.participant_service.create(input).await?;
    Ok(participant_response(&participant))
}

pub async fn read_participant(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
) -> Result<Response> {
    let participant = state.participant_service.get(participant_id).await?;
    Ok(participant_response(&participant))
}

/// Requires `If-Match` with the version being replaced
pub async fn update_participant(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
    headers: HeaderMap,
    JsonBody(body): JsonBody,
) -> Result<Response> {
    let expected_version = require_if_match(&headers)?;
    let input: ParticipantInput = parse_body(body)?;
    let participant = state
        .participant_service
        .update(participant_id, expected_version, input)
        .await?;
    Ok(participant_response(&participant))
}

pub async fn read_summary(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
) -> Result<Json<JsonValue>> {
    let summary = state.participant_service.get_summary(participant_id).await?;
    Ok(Json(serde_json::to_value(&summary).map_err(|e| {
        Error::Internal(format!("Failed to serialize participant summary: {e}"))
    })?))
}

pub async fn update_summary(
    State(state): State<AppState>,
    ParticipantId(participant_id): ParticipantId,
    JsonBody(body): JsonBody,
) -> Result<Json<JsonValue>> {
    let update: SummaryUpdate = parse_body(body)?;
    let summary = state
        .participant_service
        .update_summary(participant_id, update)
        .await?;
    Ok(Json(serde_json::to_value(&summary).map_err(|e| {
        Error::Internal(format!("Failed to serialize participant summary: {e}"))
    })?))
}
