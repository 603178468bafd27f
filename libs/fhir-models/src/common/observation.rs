//! FHIR Observation model (the subset physical measurements use)

use super::datatypes::{CodeableConcept, Quantity, Reference};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_site: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_codeable_concept: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<ObservationComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ObservationRelated>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_codeable_concept: Option<CodeableConcept>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRelated {
    /// e.g. `qualified-by`, `has-member`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Reference>,
}

impl ObservationRelated {
    pub fn target_reference(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.reference.as_deref())
    }
}

impl Observation {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("Observation") {
            return Err(Error::InvalidResource(
                "expected resourceType 'Observation'".to_string(),
            ));
        }
        serde_json::from_value(value.clone()).map_err(Error::from)
    }

    /// `code` with at least one coding
    pub fn coded_code(&self) -> Option<&CodeableConcept> {
        self.code.as_ref().filter(|c| c.has_coding())
    }
}

impl ObservationComponent {
    pub fn coded_code(&self) -> Option<&CodeableConcept> {
        self.code.as_ref().filter(|c| c.has_coding())
    }
}
