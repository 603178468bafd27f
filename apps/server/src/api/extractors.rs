//! Custom Axum extractors

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value as JsonValue;

use crate::{models::parse_participant_id, Error};

/// JSON request body accepted as `application/json`, `application/fhir+json` or with no
/// content type at all
pub struct JsonBody(pub JsonValue);

/// Error type for [`JsonBody`] extraction failures
pub struct JsonBodyRejection {
    status: StatusCode,
    message: String,
}

impl IntoResponse for JsonBodyRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "invalid",
                "diagnostics": self.message,
            }]
        });
        (self.status, axum::Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = JsonBodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let media_type = content_type.split(';').next().unwrap_or("").trim().to_string();

        if !matches!(media_type.as_str(), "" | "application/json" | "application/fhir+json") {
            return Err(JsonBodyRejection {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                message: format!("Unsupported content type: {media_type}"),
            });
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|e| JsonBodyRejection {
            status: StatusCode::BAD_REQUEST,
            message: format!("Failed to read request body: {}", e),
        })?;

        let value: JsonValue = serde_json::from_slice(&bytes).map_err(|e| JsonBodyRejection {
            status: StatusCode::BAD_REQUEST,
            message: format!("Invalid JSON in request body: {}", e),
        })?;
        Ok(JsonBody(value))
    }
}

/// `P`-prefixed participant id taken from the `:pid` path segment
pub struct ParticipantId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for ParticipantId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<std::collections::HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let raw = params
            .get("pid")
            .ok_or_else(|| Error::BadRequest("Missing participant id".to_string()).into_response())?;
        parse_participant_id(raw)
            .map(ParticipantId)
            .map_err(IntoResponse::into_response)
    }
}
