//! Routes under the API prefix

use crate::api::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn rdr_routes() -> Router<AppState> {
    Router::new()
        .route("/Participant", post(handlers::create_participant))
        .route(
            "/Participant/:pid",
            get(handlers::read_participant).put(handlers::update_participant),
        )
        .route(
            "/Participant/:pid/Summary",
            get(handlers::read_summary).put(handlers::update_summary),
        )
        .route(
            "/Participant/:pid/PhysicalMeasurements",
            get(handlers::list_physical_measurements).post(handlers::insert_physical_measurements),
        )
        .route(
            "/Participant/:pid/PhysicalMeasurements/:id",
            get(handlers::read_physical_measurements).patch(handlers::patch_physical_measurements),
        )
        .route(
            "/PhysicalMeasurements/_history",
            get(handlers::sync_physical_measurements),
        )
        .route("/Questionnaire", post(handlers::create_questionnaire))
        .route("/Questionnaire/:id", get(handlers::read_questionnaire))
        .route("/Awardee", get(handlers::list_awardees))
        .route("/Awardee/:name", get(handlers::read_awardee))
}
