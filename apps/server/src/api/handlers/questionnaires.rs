use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value as JsonValue;

use crate::{api::extractors::JsonBody, state::AppState, Result};

pub async fn create_questionnaire(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<JsonValue>> {
    Ok(Json(state.questionnaire_service.create(&body).await?))
}

pub async fn read_questionnaire(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>> {
    Ok(Json(state.questionnaire_service.get(&id).await?))
}
