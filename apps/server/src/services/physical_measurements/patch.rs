//! Cancel and restore requests

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use crate::{
    models::{PhysicalMeasurements, PhysicalMeasurementsStatus},
    Error, Result,
};

const CANCELLED: &str = "cancelled";
const RESTORED: &str = "restored";
const CANCELLED_FIELDS: [&str; 3] = ["cancelledUsername", "cancelledSiteId", "cancelledTime"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Cancel,
    Restore,
}

impl PatchAction {
    /// Body key holding `{author: {value}, site: {value}}`
    pub fn info_key(&self) -> &'static str {
        match self {
            PatchAction::Cancel => "cancelledInfo",
            PatchAction::Restore => "restoredInfo",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchAction::Cancel => CANCELLED,
            PatchAction::Restore => RESTORED,
        }
    }
}

/// A validated patch body
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub action: PatchAction,
    pub reason: String,
    /// Bare username, without `Practitioner/`
    pub author: String,
    /// Bare google group, without `Location/`
    pub site: String,
}

fn request_name(action: PatchAction) -> &'static str {
    match action {
        PatchAction::Cancel => "cancel",
        PatchAction::Restore => "restore",
    }
}

fn info_value(info: &JsonValue, key: &str, action: PatchAction) -> Result<String> {
    info.get(key)
        .and_then(|v| v.get("value"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::BadRequest(format!(
                "{}.{key}.value is required in {} request.",
                action.info_key(),
                request_name(action)
            ))
        })
}

/// Check the requested transition against the record's current status
pub fn validate_patch(record: &PhysicalMeasurements, body: &JsonValue) -> Result<PatchRequest> {
    let status = body
        .get("status")
        .and_then(JsonValue::as_str)
        .map(str::to_lowercase);

    let action = match status.as_deref() {
        Some(CANCELLED) => {
            if record.is_cancelled() {
                return Err(Error::BadRequest("This order is already cancelled".to_string()));
            }
            for field in ["status", "reason", "cancelledInfo"] {
                if body.get(field).is_none() {
                    return Err(Error::BadRequest(format!(
                        "{field} is required in cancel request."
                    )));
                }
            }
            PatchAction::Cancel
        }
        Some(RESTORED) => {
            if !record.is_cancelled() {
                return Err(Error::BadRequest(
                    "Can not restore an order that is not cancelled.".to_string(),
                ));
            }
            for field in ["status", "reason", "restoredInfo"] {
                if body.get(field).is_none() {
                    return Err(Error::BadRequest(format!(
                        "{field} is required in restore request."
                    )));
                }
            }
            PatchAction::Restore
        }
        _ => {
            return Err(Error::BadRequest(
                "status is required in restore request.".to_string(),
            ))
        }
    };

    let reason = body["reason"].as_str().map(str::to_string).ok_or_else(|| {
        Error::BadRequest(format!(
            "reason must be a string in {} request.",
            request_name(action)
        ))
    })?;
    let info = &body[action.info_key()];
    Ok(PatchRequest {
        action,
        reason,
        author: info_value(info, "author", action)?,
        site: info_value(info, "site", action)?,
    })
}

/// Move the record's root fields to the requested state
pub fn apply_patch(
    record: &mut PhysicalMeasurements,
    request: &PatchRequest,
    site_id: Option<i64>,
    now: DateTime<Utc>,
) {
    record.reason = Some(request.reason.clone());
    match request.action {
        PatchAction::Cancel => {
            record.cancelled_username = Some(request.author.clone());
            record.cancelled_site_id = site_id;
            record.cancelled_time = Some(now);
            record.status = Some(PhysicalMeasurementsStatus::Cancelled);
            record.created_site_id = None;
            record.finalized_site_id = None;
            record.finalized = None;
        }
        PatchAction::Restore => {
            record.cancelled_username = None;
            record.cancelled_site_id = None;
            record.cancelled_time = None;
            record.status = Some(PhysicalMeasurementsStatus::Unset);
            record.created_site_id = site_id;
            record.finalized_site_id = site_id;
            record.finalized_username = Some(request.author.clone());
            record.finalized = Some(now);
        }
    }
}

/// Mirror reason, status and cancellation audit fields into the stored document
pub fn add_root_fields_to_resource(record: &mut PhysicalMeasurements) {
    let status = record.status;
    let reason = record.reason.clone();
    let cancelled_username = record.cancelled_username.clone();
    let cancelled_site_id = record.cancelled_site_id;
    let cancelled_time = record.cancelled_time;

    let Some(resource) = record.resource.as_object_mut() else {
        return;
    };
    resource.insert("reason".to_string(), json!(reason));
    match status {
        Some(PhysicalMeasurementsStatus::Cancelled) => {
            resource.insert("status".to_string(), json!("CANCELLED"));
            resource.insert("cancelledUsername".to_string(), json!(cancelled_username));
            resource.insert("cancelledSiteId".to_string(), json!(cancelled_site_id));
            resource.insert(
                "cancelledTime".to_string(),
                json!(cancelled_time.map(|t| t.naive_utc().to_string())),
            );
        }
        Some(PhysicalMeasurementsStatus::Unset) => {
            resource.insert("status".to_string(), json!("RESTORED"));
            for field in CANCELLED_FIELDS {
                resource.remove(field);
            }
        }
        _ => {}
    }
}
