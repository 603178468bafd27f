//! Storage traits shared by the PostgreSQL and in-memory backends
//!
//! Every service operation opens one [`StoreTransaction`], does all of its reads and writes
//! through it and commits at the end. Dropping a transaction without committing discards
//! its writes.

use crate::{
    models::{
        Hpo, Organization, Participant, ParticipantSummary, PhysicalMeasurements,
        QuestionRow, QuestionnaireGroupRow, QuestionnaireRow, Site,
    },
    Result,
};
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// A stored questionnaire: header, groups and questions
pub type QuestionnaireRows = (QuestionnaireRow, Vec<QuestionnaireGroupRow>, Vec<QuestionRow>);

#[async_trait]
pub trait StoreTransaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    // Participants

    /// `for_update` takes a row lock until the transaction ends
    async fn get_participant(
        &mut self,
        participant_id: i64,
        for_update: bool,
    ) -> Result<Option<Participant>>;

    async fn participant_id_exists(&mut self, participant_id: i64) -> Result<bool>;

    async fn biobank_id_exists(&mut self, biobank_id: i64) -> Result<bool>;

    /// Inserts the participant and its first history row
    async fn insert_participant(&mut self, participant: &Participant) -> Result<()>;

    /// Overwrites the participant and appends a history row for its (already bumped) version
    async fn update_participant(&mut self, participant: &Participant) -> Result<()>;

    async fn get_participant_history(&mut self, participant_id: i64) -> Result<Vec<Participant>>;

    async fn get_summary(
        &mut self,
        participant_id: i64,
        for_update: bool,
    ) -> Result<Option<ParticipantSummary>>;

    async fn upsert_summary(&mut self, summary: &ParticipantSummary) -> Result<()>;

    // Reference data

    async fn list_hpos(&mut self) -> Result<Vec<Hpo>>;

    async fn get_hpo(&mut self, hpo_id: i64) -> Result<Option<Hpo>>;

    async fn get_hpo_by_name(&mut self, name: &str) -> Result<Option<Hpo>>;

    async fn insert_hpo(&mut self, hpo: &Hpo) -> Result<()>;

    async fn update_hpo(&mut self, hpo: &Hpo) -> Result<()>;

    async fn list_organizations(&mut self) -> Result<Vec<Organization>>;

    async fn get_organization(&mut self, organization_id: i64) -> Result<Option<Organization>>;

    async fn get_organization_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Organization>>;

    /// Returns the assigned `organization_id`
    async fn insert_organization(&mut self, organization: &Organization) -> Result<i64>;

    async fn update_organization(&mut self, organization: &Organization) -> Result<()>;

    async fn list_sites(&mut self) -> Result<Vec<Site>>;

    async fn get_site(&mut self, site_id: i64) -> Result<Option<Site>>;

    async fn get_site_by_google_group(&mut self, google_group: &str) -> Result<Option<Site>>;

    /// Returns the assigned `site_id`
    async fn insert_site(&mut self, site: &Site) -> Result<i64>;

    async fn update_site(&mut self, site: &Site) -> Result<()>;

    // Physical measurements

    /// Allocates the next sync feed position
    async fn next_log_position(&mut self) -> Result<i64>;

    async fn physical_measurements_id_exists(&mut self, id: i64) -> Result<bool>;

    /// One record with its measurements, components and qualifier links
    async fn get_physical_measurements(
        &mut self,
        id: i64,
        for_update: bool,
    ) -> Result<Option<PhysicalMeasurements>>;

    /// Root records of one participant ordered by log position; `measurements` left empty
    async fn list_physical_measurements_for_participant(
        &mut self,
        participant_id: i64,
    ) -> Result<Vec<PhysicalMeasurements>>;

    /// Root records of every participant ordered by log position; `measurements` left empty
    async fn list_all_physical_measurements(&mut self) -> Result<Vec<PhysicalMeasurements>>;

    /// Root records with a log position greater than `after`, at most `limit` of them
    async fn list_physical_measurements_after(
        &mut self,
        after: i64,
        limit: usize,
    ) -> Result<Vec<PhysicalMeasurements>>;

    /// Inserts the root row, every measurement and the qualifier links
    async fn insert_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()>;

    /// Rewrites the root row only
    async fn update_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()>;

    /// Replaces every measurement row (and qualifier link) of the record
    async fn replace_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()>;

    // Questionnaires

    async fn insert_questionnaire(
        &mut self,
        questionnaire: &QuestionnaireRow,
        groups: &[QuestionnaireGroupRow],
        questions: &[QuestionRow],
    ) -> Result<()>;

    async fn get_questionnaire(&mut self, questionnaire_id: &str)
        -> Result<Option<QuestionnaireRows>>;
}
