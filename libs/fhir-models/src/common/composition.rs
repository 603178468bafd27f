//! FHIR Composition model
//!
//! The first entry of a physical measurements document. Only the parts that carry
//! audit information are typed: the document date, the location extensions and the
//! authors with their authoring step.

use super::datatypes::{Extension, OneOrMany};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CompositionAuthor>,
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompositionAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<OneOrMany<Extension>>,
}

impl CompositionAuthor {
    /// `valueCode` of the first extension with the given URL
    pub fn extension_code(&self, url: &str) -> Option<&str> {
        self.extension
            .as_ref()?
            .iter()
            .find(|ext| ext.url.as_deref() == Some(url))
            .and_then(|ext| ext.value_code.as_deref())
    }
}

impl Composition {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("Composition") {
            return Err(Error::InvalidResource(
                "expected resourceType 'Composition'".to_string(),
            ));
        }
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}
