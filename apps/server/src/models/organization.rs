//! Awardee (HPO), organization and site reference data

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::enums::{OrganizationType, SiteStatus};

/// An awardee. `hpo_id` 0 is the UNSET awardee every unpaired participant points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hpo {
    pub hpo_id: i64,
    pub name: String,
    pub display_name: String,
    pub organization_type: Option<OrganizationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub organization_id: i64,
    pub external_id: String,
    pub display_name: String,
    pub hpo_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub site_id: i64,
    pub site_name: String,
    /// Unique; physical measurements documents refer to sites as `Location/<google_group>`
    pub google_group: String,
    pub mayolink_client_number: Option<i64>,
    pub organization_id: Option<i64>,
    pub hpo_id: Option<i64>,
    pub site_status: Option<SiteStatus>,
    pub launch_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub directions: Option<String>,
    pub physical_location_name: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub phone_number: Option<String>,
    pub admin_emails: Option<String>,
    pub link: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

fn insert_opt(map: &mut Map<String, JsonValue>, key: &str, value: Option<JsonValue>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

impl Site {
    pub fn to_client_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.google_group));
        map.insert("displayName".into(), json!(self.site_name));
        insert_opt(&mut map, "mayolinkClientNumber", self.mayolink_client_number.map(|n| json!(n)));
        insert_opt(&mut map, "siteStatus", self.site_status.map(|s| json!(s)));
        insert_opt(&mut map, "launchDate", self.launch_date.map(|d| json!(d.to_string())));
        insert_opt(&mut map, "notes", self.notes.as_ref().map(|v| json!(v)));
        insert_opt(&mut map, "directions", self.directions.as_ref().map(|v| json!(v)));
        insert_opt(
            &mut map,
            "physicalLocationName",
            self.physical_location_name.as_ref().map(|v| json!(v)),
        );

        let address: Vec<&String> = [&self.address_1, &self.address_2]
            .into_iter()
            .flatten()
            .collect();
        if !address.is_empty() || self.city.is_some() || self.state.is_some() || self.zip_code.is_some() {
            let mut addr = Map::new();
            addr.insert("line".into(), json!(address));
            insert_opt(&mut addr, "city", self.city.as_ref().map(|v| json!(v)));
            insert_opt(&mut addr, "state", self.state.as_ref().map(|v| json!(v)));
            insert_opt(&mut addr, "postalCode", self.zip_code.as_ref().map(|v| json!(v)));
            map.insert("address".into(), JsonValue::Object(addr));
        }
        insert_opt(&mut map, "phoneNumber", self.phone_number.as_ref().map(|v| json!(v)));
        insert_opt(&mut map, "adminEmails", self.admin_emails.as_ref().map(|v| json!(v)));
        insert_opt(&mut map, "link", self.link.as_ref().map(|v| json!(v)));
        JsonValue::Object(map)
    }
}

impl Organization {
    pub fn to_client_json(&self, sites: &[&Site]) -> JsonValue {
        json!({
            "id": self.external_id,
            "displayName": self.display_name,
            "sites": sites.iter().map(|s| s.to_client_json()).collect::<Vec<_>>(),
        })
    }
}

impl Hpo {
    /// Awardee with its organizations and their sites nested
    pub fn to_client_json(&self, organizations: &[&Organization], sites: &[Site]) -> JsonValue {
        let orgs: Vec<JsonValue> = organizations
            .iter()
            .map(|org| {
                let org_sites: Vec<&Site> = sites
                    .iter()
                    .filter(|s| s.organization_id == Some(org.organization_id))
                    .collect();
                org.to_client_json(&org_sites)
            })
            .collect();
        json!({
            "id": self.name,
            "displayName": self.display_name,
            "type": self.organization_type.unwrap_or(OrganizationType::Unset),
            "organizations": orgs,
        })
    }
}
