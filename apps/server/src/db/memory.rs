//! In-process store used by tests and `database.backend = "memory"`
//!
//! Transactions are serialized: `begin` takes the table lock and works on a copy, which
//! replaces the tables on commit.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::traits::{QuestionnaireRows, Store, StoreTransaction};
use crate::{
    models::{
        Hpo, Organization, OrganizationType, Participant, ParticipantSummary,
        PhysicalMeasurements, QuestionRow, QuestionnaireGroupRow, QuestionnaireRow, Site,
    },
    Error, Result,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    participants: BTreeMap<i64, Participant>,
    participant_history: Vec<Participant>,
    summaries: BTreeMap<i64, ParticipantSummary>,
    hpos: BTreeMap<i64, Hpo>,
    organizations: BTreeMap<i64, Organization>,
    sites: BTreeMap<i64, Site>,
    physical_measurements: BTreeMap<i64, PhysicalMeasurements>,
    log_position: i64,
    questionnaires: BTreeMap<String, QuestionnaireRows>,
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store holding only the UNSET awardee
    pub fn new() -> Self {
        let mut tables = Tables::default();
        tables.hpos.insert(
            0,
            Hpo {
                hpo_id: 0,
                name: "UNSET".to_string(),
                display_name: "Unset".to_string(),
                organization_type: Some(OrganizationType::Unset),
            },
        );
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn roots(records: impl Iterator<Item = PhysicalMeasurements>) -> Vec<PhysicalMeasurements> {
    let mut roots: Vec<PhysicalMeasurements> = records
        .map(|mut pm| {
            pm.measurements.clear();
            pm
        })
        .collect();
    roots.sort_by_key(|pm| pm.log_position_id);
    roots
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn get_participant(
        &mut self,
        participant_id: i64,
        _for_update: bool,
    ) -> Result<Option<Participant>> {
        Ok(self.working.participants.get(&participant_id).cloned())
    }

    async fn participant_id_exists(&mut self, participant_id: i64) -> Result<bool> {
        Ok(self.working.participants.contains_key(&participant_id))
    }

    async fn biobank_id_exists(&mut self, biobank_id: i64) -> Result<bool> {
        Ok(self
            .working
            .participants
            .values()
            .any(|p| p.biobank_id == biobank_id))
    }

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()> {
        if self.working.participants.contains_key(&participant.participant_id) {
            return Err(Error::Conflict(format!(
                "Participant {} already exists",
                participant.participant_id
            )));
        }
        self.working
            .participants
            .insert(participant.participant_id, participant.clone());
        self.working.participant_history.push(participant.clone());
        Ok(())
    }

    async fn update_participant(&mut self, participant: &Participant) -> Result<()> {
        match self.working.participants.get_mut(&participant.participant_id) {
            Some(existing) => *existing = participant.clone(),
            None => {
                return Err(Error::NotFound(format!(
                    "Participant {} not found",
                    participant.participant_id
                )))
            }
        }
        self.working.participant_history.push(participant.clone());
        Ok(())
    }

    async fn get_participant_history(&mut self, participant_id: i64) -> Result<Vec<Participant>> {
        let mut history: Vec<Participant> = self
            .working
            .participant_history
            .iter()
            .filter(|p| p.participant_id == participant_id)
            .cloned()
            .collect();
        history.sort_by_key(|p| p.version);
        Ok(history)
    }

    async fn get_summary(
        &mut self,
        participant_id: i64,
        _for_update: bool,
    ) -> Result<Option<ParticipantSummary>> {
        Ok(self.working.summaries.get(&participant_id).cloned())
    }

    async fn upsert_summary(&mut self, summary: &ParticipantSummary) -> Result<()> {
        self.working
            .summaries
            .insert(summary.participant_id, summary.clone());
        Ok(())
    }

    async fn list_hpos(&mut self) -> Result<Vec<Hpo>> {
        Ok(self.working.hpos.values().cloned().collect())
    }

    async fn get_hpo(&mut self, hpo_id: i64) -> Result<Option<Hpo>> {
        Ok(self.working.hpos.get(&hpo_id).cloned())
    }

    async fn get_hpo_by_name(&mut self, name: &str) -> Result<Option<Hpo>> {
        Ok(self.working.hpos.values().find(|h| h.name == name).cloned())
    }

    async fn insert_hpo(&mut self, hpo: &Hpo) -> Result<()> {
        if self.working.hpos.contains_key(&hpo.hpo_id) {
            return Err(Error::Conflict(format!("HPO {} already exists", hpo.hpo_id)));
        }
        self.working.hpos.insert(hpo.hpo_id, hpo.clone());
        Ok(())
    }

    async fn update_hpo(&mut self, hpo: &Hpo) -> Result<()> {
        self.working.hpos.insert(hpo.hpo_id, hpo.clone());
        Ok(())
    }

    async fn list_organizations(&mut self) -> Result<Vec<Organization>> {
        Ok(self.working.organizations.values().cloned().collect())
    }

    async fn get_organization(&mut self, organization_id: i64) -> Result<Option<Organization>> {
        Ok(self.working.organizations.get(&organization_id).cloned())
    }

    async fn get_organization_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Organization>> {
        Ok(self
            .working
            .organizations
            .values()
            .find(|o| o.external_id == external_id)
            .cloned())
    }

    async fn insert_organization(&mut self, organization: &Organization) -> Result<i64> {
        let id = self
            .working
            .organizations
            .keys()
            .next_back()
            .map_or(1, |last| last + 1);
        let mut organization = organization.clone();
        organization.organization_id = id;
        self.working.organizations.insert(id, organization);
        Ok(id)
    }

    async fn update_organization(&mut self, organization: &Organization) -> Result<()> {
        self.working
            .organizations
            .insert(organization.organization_id, organization.clone());
        Ok(())
    }

    async fn list_sites(&mut self) -> Result<Vec<Site>> {
        Ok(self.working.sites.values().cloned().collect())
    }

    async fn get_site(&mut self, site_id: i64) -> Result<Option<Site>> {
        Ok(self.working.sites.get(&site_id).cloned())
    }

    async fn get_site_by_google_group(&mut self, google_group: &str) -> Result<Option<Site>> {
        Ok(self
            .working
            .sites
            .values()
            .find(|s| s.google_group == google_group)
            .cloned())
    }

    async fn insert_site(&mut self, site: &Site) -> Result<i64> {
        if self
            .working
            .sites
            .values()
            .any(|s| s.google_group == site.google_group)
        {
            return Err(Error::Conflict(format!(
                "Site {} already exists",
                site.google_group
            )));
        }
        let id = self
            .working
            .sites
            .keys()
            .next_back()
            .map_or(1, |last| last + 1);
        let mut site = site.clone();
        site.site_id = id;
        self.working.sites.insert(id, site);
        Ok(id)
    }

    async fn update_site(&mut self, site: &Site) -> Result<()> {
        self.working.sites.insert(site.site_id, site.clone());
        Ok(())
    }

    async fn next_log_position(&mut self) -> Result<i64> {
        self.working.log_position += 1;
        Ok(self.working.log_position)
    }

    async fn physical_measurements_id_exists(&mut self, id: i64) -> Result<bool> {
        Ok(self.working.physical_measurements.contains_key(&id))
    }

    async fn get_physical_measurements(
        &mut self,
        id: i64,
        _for_update: bool,
    ) -> Result<Option<PhysicalMeasurements>> {
        Ok(self.working.physical_measurements.get(&id).cloned())
    }

    async fn list_physical_measurements_for_participant(
        &mut self,
        participant_id: i64,
    ) -> Result<Vec<PhysicalMeasurements>> {
        Ok(roots(
            self.working
                .physical_measurements
                .values()
                .filter(|pm| pm.participant_id == participant_id)
                .cloned(),
        ))
    }

    async fn list_all_physical_measurements(&mut self) -> Result<Vec<PhysicalMeasurements>> {
        Ok(roots(self.working.physical_measurements.values().cloned()))
    }

    async fn list_physical_measurements_after(
        &mut self,
        after: i64,
        limit: usize,
    ) -> Result<Vec<PhysicalMeasurements>> {
        let mut page = roots(
            self.working
                .physical_measurements
                .values()
                .filter(|pm| pm.log_position_id > after)
                .cloned(),
        );
        page.truncate(limit);
        Ok(page)
    }

    async fn insert_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        if self
            .working
            .physical_measurements
            .contains_key(&record.physical_measurements_id)
        {
            return Err(Error::Conflict(format!(
                "Physical measurements {} already exist",
                record.physical_measurements_id
            )));
        }
        self.working
            .physical_measurements
            .insert(record.physical_measurements_id, record.clone());
        Ok(())
    }

    async fn update_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let existing = self
            .working
            .physical_measurements
            .get_mut(&record.physical_measurements_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Physical measurements {} not found",
                    record.physical_measurements_id
                ))
            })?;
        let measurements = std::mem::take(&mut existing.measurements);
        *existing = record.clone();
        existing.measurements = measurements;
        Ok(())
    }

    async fn replace_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let existing = self
            .working
            .physical_measurements
            .get_mut(&record.physical_measurements_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Physical measurements {} not found",
                    record.physical_measurements_id
                ))
            })?;
        existing.measurements = record.measurements.clone();
        Ok(())
    }

    async fn insert_questionnaire(
        &mut self,
        questionnaire: &QuestionnaireRow,
        groups: &[QuestionnaireGroupRow],
        questions: &[QuestionRow],
    ) -> Result<()> {
        if self
            .working
            .questionnaires
            .contains_key(&questionnaire.questionnaire_id)
        {
            return Err(Error::Conflict(format!(
                "Questionnaire {} already exists",
                questionnaire.questionnaire_id
            )));
        }
        self.working.questionnaires.insert(
            questionnaire.questionnaire_id.clone(),
            (questionnaire.clone(), groups.to_vec(), questions.to_vec()),
        );
        Ok(())
    }

    async fn get_questionnaire(
        &mut self,
        questionnaire_id: &str,
    ) -> Result<Option<QuestionnaireRows>> {
        Ok(self.working.questionnaires.get(questionnaire_id).cloned())
    }
}
