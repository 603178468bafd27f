//! DSTU2 Questionnaire model
//!
//! A questionnaire has one root group; groups nest groups and questions, and a question
//! may nest further groups.

use super::datatypes::{Coding, Reference};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<QuestionnaireGroup>,
    /// identifier, telecom, text, contained, ...
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "Questionnaire".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<QuestionnaireGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub question: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,
    /// Reference to a ValueSet of permitted answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<QuestionnaireGroup>,
}

impl Questionnaire {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("Questionnaire") {
            return Err(Error::InvalidResource(
                "expected resourceType 'Questionnaire'".to_string(),
            ));
        }
        serde_json::from_value(value.clone()).map_err(Error::from)
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }
}
