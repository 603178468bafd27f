use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::{
    db::Store,
    models::{Hpo, Organization},
    Error, Result,
};

/// Read-only view of the awardee / organization / site hierarchy
pub struct AwardeeService {
    store: Arc<dyn Store>,
}

impl AwardeeService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn load(&self) -> Result<(Vec<Hpo>, Vec<Organization>, Vec<crate::models::Site>)> {
        let mut tx = self.store.begin().await?;
        let hpos = tx.list_hpos().await?;
        let organizations = tx.list_organizations().await?;
        let sites = tx.list_sites().await?;
        tx.rollback().await?;
        Ok((hpos, organizations, sites))
    }

    /// Every awardee except UNSET, ordered by id
    pub async fn list(&self) -> Result<Vec<JsonValue>> {
        let (mut hpos, organizations, sites) = self.load().await?;
        hpos.sort_by_key(|hpo| hpo.hpo_id);
        Ok(hpos
            .iter()
            .filter(|hpo| hpo.hpo_id != 0)
            .map(|hpo| {
                let orgs: Vec<&Organization> = organizations
                    .iter()
                    .filter(|org| org.hpo_id == hpo.hpo_id)
                    .collect();
                hpo.to_client_json(&orgs, &sites)
            })
            .collect())
    }

    pub async fn get(&self, name: &str) -> Result<JsonValue> {
        let (hpos, organizations, sites) = self.load().await?;
        let hpo = hpos
            .iter()
            .find(|hpo| hpo.name == name)
            .ok_or_else(|| Error::NotFound(format!("Awardee {name} not found")))?;
        let orgs: Vec<&Organization> = organizations
            .iter()
            .filter(|org| org.hpo_id == hpo.hpo_id)
            .collect();
        Ok(hpo.to_client_json(&orgs, &sites))
    }
}
