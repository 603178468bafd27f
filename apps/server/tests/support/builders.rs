use axum::body::Bytes;
use serde_json::{json, Value};

use super::fixtures::constants;

/// Converts a JSON value to request body bytes
pub fn to_json_body(value: &Value) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Builder for physical measurements document bundles
///
/// The first entry is always the Composition; observations follow in insertion order.
pub struct DocumentBuilder {
    date: Option<String>,
    created_site: Option<String>,
    finalized_site: Option<String>,
    created_by: Option<String>,
    finalized_by: Option<String>,
    amends: Option<String>,
    observations: Vec<Value>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            date: Some("2018-03-01T11:30:00Z".to_string()),
            created_site: None,
            finalized_site: None,
            created_by: None,
            finalized_by: None,
            amends: None,
            observations: Vec::new(),
        }
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn created_at(mut self, google_group: impl Into<String>) -> Self {
        self.created_site = Some(google_group.into());
        self
    }

    pub fn finalized_at(mut self, google_group: impl Into<String>) -> Self {
        self.finalized_site = Some(google_group.into());
        self
    }

    pub fn created_by(mut self, username: impl Into<String>) -> Self {
        self.created_by = Some(username.into());
        self
    }

    pub fn finalized_by(mut self, username: impl Into<String>) -> Self {
        self.finalized_by = Some(username.into());
        self
    }

    /// Reference an earlier record by its server id
    pub fn amends(mut self, physical_measurements_id: impl Into<String>) -> Self {
        self.amends = Some(physical_measurements_id.into());
        self
    }

    /// A quantity observation coded with both LOINC and the PMI system
    pub fn quantity(mut self, full_url: &str, code: &str, value: f64, unit: &str) -> Self {
        self.observations.push(json!({
            "fullUrl": full_url,
            "resource": {
                "resourceType": "Observation",
                "status": "final",
                "effectiveDateTime": "2018-03-01T06:30:00-05:00",
                "code": {"coding": [
                    {"system": constants::LOINC_SYSTEM, "code": code},
                    {"system": constants::PMI_SYSTEM, "code": format!("pmi-{code}")}
                ]},
                "valueQuantity": {"value": value, "unit": unit, "code": unit, "system": "http://unitsofmeasure.org"}
            }
        }));
        self
    }

    /// Add an arbitrary observation entry
    pub fn observation(mut self, entry: Value) -> Self {
        self.observations.push(entry);
        self
    }

    fn composition(&self) -> Value {
        let mut extension = Vec::new();
        if let Some(site) = &self.created_site {
            extension.push(json!({"url": constants::CREATED_LOCATION_URL, "valueReference": format!("Location/{site}")}));
        }
        if let Some(site) = &self.finalized_site {
            extension.push(json!({"url": constants::FINALIZED_LOCATION_URL, "valueReference": format!("Location/{site}")}));
        }
        if let Some(amended) = &self.amends {
            extension.push(json!({
                "url": constants::AMENDMENT_URL,
                "valueReference": {"reference": format!("PhysicalMeasurements/{amended}")}
            }));
        }

        let mut author = Vec::new();
        if let Some(username) = &self.created_by {
            author.push(json!({
                "reference": format!("Practitioner/{username}"),
                "extension": {"url": constants::AUTHORING_STEP_URL, "valueCode": "created"}
            }));
        }
        if let Some(username) = &self.finalized_by {
            author.push(json!({
                "reference": format!("Practitioner/{username}"),
                "extension": {"url": constants::AUTHORING_STEP_URL, "valueCode": "finalized"}
            }));
        }

        let mut composition = json!({
            "resourceType": "Composition",
            "status": "final",
            "type": {"coding": [{"system": constants::PMI_SYSTEM, "code": "intake-exam-v0.0.1"}]},
            "title": "PMI Intake Evaluation",
            "extension": extension,
            "author": author,
        });
        if let (Some(date), Some(map)) = (&self.date, composition.as_object_mut()) {
            map.insert("date".to_string(), json!(date));
        }
        json!({"fullUrl": "urn:example:report", "resource": composition})
    }

    pub fn build(self) -> Value {
        let mut entries = vec![self.composition()];
        entries.extend(self.observations);
        json!({
            "resourceType": "Bundle",
            "type": "document",
            "entry": entries
        })
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of a cancel or restore request
pub fn patch_body(status: &str, author: &str, site: &str) -> Value {
    let info_key = if status.eq_ignore_ascii_case("restored") {
        "restoredInfo"
    } else {
        "cancelledInfo"
    };
    json!({
        "status": status,
        "reason": "entered for the wrong participant",
        info_key: {
            "author": {"system": "https://www.pmi-ops.org/healthpro-username", "value": author},
            "site": {"system": "https://www.pmi-ops.org/site-id", "value": site}
        }
    })
}
