//! FHIR Bundle model
//!
//! Physical measurements arrive as `document` bundles; the server answers list and
//! sync requests with `searchset` bundles.

use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR Bundle resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Resource type - always "Bundle"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Clients are not consistent about sending this, so it stays optional
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<BundleType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Vec<BundleLink>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Vec<BundleEntry>>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "Bundle".to_string()
}

/// Type of Bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
}

/// Links related to this Bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// Entry in the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    /// Used by observations to reference each other (`related.target.reference`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    /// Kept untyped; callers pick the concrete model from `resourceType`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl BundleEntry {
    /// `resource.resourceType`, if the entry carries a resource
    pub fn resource_type(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
    }
}

impl Bundle {
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            id: None,
            bundle_type: Some(bundle_type),
            total: None,
            link: None,
            entry: None,
            extensions: HashMap::new(),
        }
    }

    /// Build a `searchset` bundle around already-rendered resources
    pub fn searchset(resources: Vec<Value>, next_url: Option<String>) -> Self {
        let mut bundle = Bundle::new(BundleType::Searchset);
        bundle.entry = Some(
            resources
                .into_iter()
                .map(|resource| BundleEntry {
                    full_url: None,
                    resource: Some(resource),
                    extensions: HashMap::new(),
                })
                .collect(),
        );
        bundle.link = next_url.map(|url| {
            vec![BundleLink {
                relation: "next".to_string(),
                url,
            }]
        });
        bundle
    }

    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return Err(Error::InvalidResource(
                "expected resourceType 'Bundle'".to_string(),
            ));
        }
        serde_json::from_value(value.clone()).map_err(Error::from)
    }

    /// Convert to JSON Value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    pub fn entry_count(&self) -> usize {
        self.entry.as_ref().map(|e| e.len()).unwrap_or(0)
    }

    pub fn entries(&self) -> &[BundleEntry] {
        self.entry.as_deref().unwrap_or(&[])
    }

    /// The first entry's resource; by convention this is the document's Composition
    pub fn first_resource(&self) -> Option<&Value> {
        self.entries().first().and_then(|e| e.resource.as_ref())
    }
}
