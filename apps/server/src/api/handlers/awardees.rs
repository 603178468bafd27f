use axum::{
    extract::{Path, State},
    Json,
};
use rdr_fhir_models::Bundle;
use serde_json::Value as JsonValue;

use crate::{state::AppState, Result};

pub async fn list_awardees(State(state): State<AppState>) -> Result<Json<JsonValue>> {
    let awardees = state.awardee_service.list().await?;
    Ok(Json(Bundle::searchset(awardees, None).to_value()?))
}

pub async fn read_awardee(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JsonValue>> {
    Ok(Json(state.awardee_service.get(&name).await?))
}
