//! Participant service
//!
//! Participants are versioned: every write bumps `version` and appends a history row.
//! The summary mirrors the participant's pairing and withdrawal status and carries the
//! enrollment inputs.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::{
    clock::Clock,
    config::EnrollmentConfig,
    db::{Store, StoreTransaction},
    models::{
        format_participant_id, Participant, ParticipantInput, ParticipantSummary, SummaryUpdate,
        WithdrawalStatus,
    },
    services::random_id,
    Error, Result,
};

const MAX_ID_ATTEMPTS: usize = 20;
const UNSET_HPO_ID: i64 = 0;
const ORGANIZATION_PREFIX: &str = "Organization/";

/// Unknown participant is 404, withdrawn participant is 403
pub async fn validate_participant_id(
    tx: &mut dyn StoreTransaction,
    participant_id: i64,
) -> Result<Participant> {
    let participant = tx
        .get_participant(participant_id, false)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Participant {} not found",
                format_participant_id(participant_id)
            ))
        })?;
    raise_if_withdrawn(&participant)?;
    Ok(participant)
}

/// Like [`validate_participant_id`], but an unknown participant is a bad reference (400)
pub async fn validate_participant_reference(
    tx: &mut dyn StoreTransaction,
    participant_id: i64,
) -> Result<Participant> {
    let participant = tx
        .get_participant(participant_id, false)
        .await?
        .ok_or_else(|| {
            Error::BadRequest(format!(
                "Participant {} not found",
                format_participant_id(participant_id)
            ))
        })?;
    raise_if_withdrawn(&participant)?;
    Ok(participant)
}

pub fn raise_if_withdrawn(participant: &Participant) -> Result<()> {
    if participant.is_withdrawn() {
        return Err(Error::Forbidden(format!(
            "Participant {} has withdrawn",
            format_participant_id(participant.participant_id)
        )));
    }
    Ok(())
}

/// `[{primary: true, organization: {reference: "Organization/<awardee>"}}]`
pub fn primary_provider_link(hpo_name: &str) -> JsonValue {
    json!([{
        "primary": true,
        "organization": {"reference": format!("{ORGANIZATION_PREFIX}{hpo_name}")}
    }])
}

/// Awardee name of the primary provider link, if any
fn primary_awardee_name(provider_link: &JsonValue) -> Option<&str> {
    provider_link
        .as_array()?
        .iter()
        .find(|link| link.get("primary").and_then(JsonValue::as_bool) == Some(true))?
        .pointer("/organization/reference")?
        .as_str()?
        .strip_prefix(ORGANIZATION_PREFIX)
}

async fn hpo_for_provider_link(
    tx: &mut dyn StoreTransaction,
    provider_link: Option<&JsonValue>,
) -> Result<i64> {
    let Some(name) = provider_link.and_then(primary_awardee_name) else {
        return Ok(UNSET_HPO_ID);
    };
    let hpo = tx
        .get_hpo_by_name(name)
        .await?
        .ok_or_else(|| Error::BadRequest(format!("No awardee found with name {name}")))?;
    Ok(hpo.hpo_id)
}

/// Pair a participant with the awardee, organization and site of `site_id`.
///
/// A participant already paired with that site is left untouched.
pub async fn add_missing_hpo_from_site(
    tx: &mut dyn StoreTransaction,
    now: DateTime<Utc>,
    participant_id: i64,
    site_id: i64,
) -> Result<()> {
    let site = tx
        .get_site(site_id)
        .await?
        .ok_or_else(|| Error::BadRequest(format!("Invalid siteId reference {site_id}")))?;

    let mut participant = tx
        .get_participant(participant_id, true)
        .await?
        .ok_or_else(|| {
            Error::BadRequest(format!(
                "Participant {} not found",
                format_participant_id(participant_id)
            ))
        })?;
    if participant.site_id == Some(site_id) {
        return Ok(());
    }

    let hpo_id = site.hpo_id.ok_or_else(|| {
        Error::BadRequest(format!("Site {} is not paired with an awardee", site.google_group))
    })?;
    let hpo = tx
        .get_hpo(hpo_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Site {site_id} refers to unknown awardee {hpo_id}")))?;

    tracing::info!(
        participant_id = %format_participant_id(participant_id),
        site = %site.google_group,
        awardee = %hpo.name,
        "Pairing participant with physical measurements site"
    );

    participant.hpo_id = hpo.hpo_id;
    participant.organization_id = site.organization_id;
    participant.site_id = Some(site_id);
    participant.provider_link = Some(primary_provider_link(&hpo.name));
    participant.version += 1;
    participant.last_modified = now;
    tx.update_participant(&participant).await?;

    if let Some(mut summary) = tx.get_summary(participant_id, true).await? {
        summary.hpo_id = participant.hpo_id;
        summary.organization_id = participant.organization_id;
        summary.site_id = participant.site_id;
        summary.last_modified = now;
        tx.upsert_summary(&summary).await?;
    }
    Ok(())
}

pub struct ParticipantService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    baseline_module_count: i32,
}

impl ParticipantService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, enrollment: &EnrollmentConfig) -> Self {
        Self {
            store,
            clock,
            baseline_module_count: enrollment.baseline_ppi_module_count,
        }
    }

    pub async fn create(&self, input: ParticipantInput) -> Result<Participant> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        let hpo_id = hpo_for_provider_link(tx.as_mut(), input.provider_link.as_ref()).await?;
        let participant_id = unused_participant_id(tx.as_mut()).await?;
        let biobank_id = unused_biobank_id(tx.as_mut()).await?;

        let participant = Participant {
            participant_id,
            biobank_id,
            version: 1,
            hpo_id,
            organization_id: None,
            site_id: None,
            provider_link: input.provider_link,
            withdrawal_status: input.withdrawal_status.unwrap_or_default(),
            sign_up_time: now,
            last_modified: now,
        };
        tx.insert_participant(&participant).await?;
        tx.commit().await?;

        tracing::info!(
            participant_id = %format_participant_id(participant_id),
            "Participant created"
        );
        Ok(participant)
    }

    pub async fn get(&self, participant_id: i64) -> Result<Participant> {
        let mut tx = self.store.begin().await?;
        let participant = tx.get_participant(participant_id, false).await?;
        tx.rollback().await?;
        participant.ok_or_else(|| {
            Error::NotFound(format!(
                "Participant {} not found",
                format_participant_id(participant_id)
            ))
        })
    }

    pub async fn history(&self, participant_id: i64) -> Result<Vec<Participant>> {
        let mut tx = self.store.begin().await?;
        let history = tx.get_participant_history(participant_id).await?;
        tx.rollback().await?;
        Ok(history)
    }

    /// Apply client-writable fields; `expected_version` comes from `If-Match`
    pub async fn update(
        &self,
        participant_id: i64,
        expected_version: i32,
        input: ParticipantInput,
    ) -> Result<Participant> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        let mut participant = tx
            .get_participant(participant_id, true)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Participant {} not found",
                    format_participant_id(participant_id)
                ))
            })?;
        if participant.version != expected_version {
            return Err(Error::PreconditionFailed(format!(
                "Participant {} is at version {}, not {}",
                format_participant_id(participant_id),
                participant.version,
                expected_version
            )));
        }
        raise_if_withdrawn(&participant)?;

        if let Some(link) = input.provider_link {
            participant.hpo_id = hpo_for_provider_link(tx.as_mut(), Some(&link)).await?;
            participant.provider_link = Some(link);
        }
        if let Some(status) = input.withdrawal_status {
            participant.withdrawal_status = status;
        }
        participant.version += 1;
        participant.last_modified = now;
        tx.update_participant(&participant).await?;

        if let Some(mut summary) = tx.get_summary(participant_id, true).await? {
            summary.hpo_id = participant.hpo_id;
            summary.withdrawal_status = participant.withdrawal_status;
            summary.last_modified = now;
            tx.upsert_summary(&summary).await?;
        }
        tx.commit().await?;

        if participant.is_withdrawn() {
            tracing::info!(
                participant_id = %format_participant_id(participant_id),
                "Participant withdrawn"
            );
        }
        Ok(participant)
    }

    pub async fn withdraw(&self, participant_id: i64, expected_version: i32) -> Result<Participant> {
        self.update(
            participant_id,
            expected_version,
            ParticipantInput {
                provider_link: None,
                withdrawal_status: Some(WithdrawalStatus::NoUse),
            },
        )
        .await
    }

    pub async fn get_summary(&self, participant_id: i64) -> Result<ParticipantSummary> {
        let mut tx = self.store.begin().await?;
        let summary = tx.get_summary(participant_id, false).await?;
        tx.rollback().await?;
        summary.ok_or_else(|| {
            Error::NotFound(format!(
                "Participant summary for {} not found",
                format_participant_id(participant_id)
            ))
        })
    }

    /// Create or update the summary's enrollment inputs and recompute enrollment status
    pub async fn update_summary(
        &self,
        participant_id: i64,
        update: SummaryUpdate,
    ) -> Result<ParticipantSummary> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        let participant = validate_participant_id(tx.as_mut(), participant_id).await?;
        if let Some(site_id) = update.biospecimen_collected_site_id {
            if tx.get_site(site_id).await?.is_none() {
                return Err(Error::BadRequest(format!("Invalid siteId reference {site_id}")));
            }
        }

        let mut summary = match tx.get_summary(participant_id, true).await? {
            Some(summary) => summary,
            None => ParticipantSummary::for_participant(&participant, now),
        };
        update.apply(&mut summary);
        summary.update_enrollment_status(self.baseline_module_count);
        summary.last_modified = now;
        tx.upsert_summary(&summary).await?;
        tx.commit().await?;
        Ok(summary)
    }
}

async fn unused_participant_id(tx: &mut dyn StoreTransaction) -> Result<i64> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = random_id();
        if !tx.participant_id_exists(id).await? {
            return Ok(id);
        }
    }
    Err(Error::Internal(
        "Could not allocate an unused participant id".to_string(),
    ))
}

async fn unused_biobank_id(tx: &mut dyn StoreTransaction) -> Result<i64> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = random_id();
        if !tx.biobank_id_exists(id).await? {
            return Ok(id);
        }
    }
    Err(Error::Internal("Could not allocate an unused biobank id".to_string()))
}
