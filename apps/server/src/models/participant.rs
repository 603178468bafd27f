//! Participant and participant summary models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};

use super::enums::{
    EnrollmentStatus, PhysicalMeasurementsStatus, QuestionnaireStatus, SampleStatus,
    WithdrawalStatus,
};
use crate::{Error, Result};

/// Participant ids appear as `P<digits>` outside the server
pub fn format_participant_id(id: i64) -> String {
    format!("P{id}")
}

pub fn format_biobank_id(id: i64) -> String {
    format!("B{id}")
}

pub fn parse_participant_id(value: &str) -> Result<i64> {
    value
        .strip_prefix('P')
        .and_then(|digits| digits.parse::<i64>().ok())
        .ok_or_else(|| Error::BadRequest(format!("Invalid participant ID: {value}")))
}

fn serialize_participant_id<S: Serializer>(id: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_participant_id(*id))
}

fn serialize_biobank_id<S: Serializer>(id: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_biobank_id(*id))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_id: i64,
    pub biobank_id: i64,
    /// Starts at 1, bumped on every update
    pub version: i32,
    /// 0 is the UNSET awardee
    pub hpo_id: i64,
    pub organization_id: Option<i64>,
    pub site_id: Option<i64>,
    pub provider_link: Option<JsonValue>,
    pub withdrawal_status: WithdrawalStatus,
    pub sign_up_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Participant {
    pub fn is_withdrawn(&self) -> bool {
        self.withdrawal_status == WithdrawalStatus::NoUse
    }

    pub fn to_client_json(&self) -> JsonValue {
        let mut body = json!({
            "participantId": format_participant_id(self.participant_id),
            "biobankId": format_biobank_id(self.biobank_id),
            "meta": {"versionId": format!("W/\"{}\"", self.version)},
            "hpoId": self.hpo_id,
            "withdrawalStatus": self.withdrawal_status,
            "signUpTime": self.sign_up_time.to_rfc3339(),
            "lastModified": self.last_modified.to_rfc3339(),
        });
        if let Some(map) = body.as_object_mut() {
            if let Some(org) = self.organization_id {
                map.insert("organizationId".into(), json!(org));
            }
            if let Some(site) = self.site_id {
                map.insert("siteId".into(), json!(site));
            }
            if let Some(link) = &self.provider_link {
                map.insert("providerLink".into(), link.clone());
            }
        }
        body
    }
}

/// Client-writable participant fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    #[serde(default)]
    pub provider_link: Option<JsonValue>,
    #[serde(default)]
    pub withdrawal_status: Option<WithdrawalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    #[serde(serialize_with = "serialize_participant_id")]
    pub participant_id: i64,
    #[serde(serialize_with = "serialize_biobank_id")]
    pub biobank_id: i64,
    pub hpo_id: i64,
    pub organization_id: Option<i64>,
    pub site_id: Option<i64>,
    pub withdrawal_status: WithdrawalStatus,
    pub enrollment_status: EnrollmentStatus,
    pub consent_for_study_enrollment: QuestionnaireStatus,
    pub consent_for_electronic_health_records: QuestionnaireStatus,
    #[serde(rename = "numCompletedBaselinePPIModules")]
    pub num_completed_baseline_ppi_modules: i32,
    #[serde(rename = "samplesToIsolateDNA")]
    pub samples_to_isolate_dna: SampleStatus,
    pub biospecimen_collected_site_id: Option<i64>,
    pub physical_measurements_status: Option<PhysicalMeasurementsStatus>,
    pub physical_measurements_time: Option<DateTime<Utc>>,
    pub physical_measurements_finalized_time: Option<DateTime<Utc>>,
    pub physical_measurements_created_site_id: Option<i64>,
    pub physical_measurements_finalized_site_id: Option<i64>,
    pub last_modified: DateTime<Utc>,
}

impl ParticipantSummary {
    /// A fresh summary mirroring the participant's pairing and withdrawal state
    pub fn for_participant(participant: &Participant, now: DateTime<Utc>) -> Self {
        Self {
            participant_id: participant.participant_id,
            biobank_id: participant.biobank_id,
            hpo_id: participant.hpo_id,
            organization_id: participant.organization_id,
            site_id: participant.site_id,
            withdrawal_status: participant.withdrawal_status,
            enrollment_status: EnrollmentStatus::Interested,
            consent_for_study_enrollment: QuestionnaireStatus::Unset,
            consent_for_electronic_health_records: QuestionnaireStatus::Unset,
            num_completed_baseline_ppi_modules: 0,
            samples_to_isolate_dna: SampleStatus::Unset,
            biospecimen_collected_site_id: None,
            physical_measurements_status: None,
            physical_measurements_time: None,
            physical_measurements_finalized_time: None,
            physical_measurements_created_site_id: None,
            physical_measurements_finalized_site_id: None,
            last_modified: now,
        }
    }

    pub fn is_withdrawn(&self) -> bool {
        self.withdrawal_status == WithdrawalStatus::NoUse
    }

    /// Enrollment status implied by consents, questionnaires, measurements and samples
    pub fn calculate_enrollment_status(&self, baseline_module_count: i32) -> EnrollmentStatus {
        let consented = self.consent_for_study_enrollment == QuestionnaireStatus::Submitted
            && self.consent_for_electronic_health_records == QuestionnaireStatus::Submitted;
        if !consented {
            return EnrollmentStatus::Interested;
        }

        let full = self.num_completed_baseline_ppi_modules == baseline_module_count
            && self.physical_measurements_status == Some(PhysicalMeasurementsStatus::Completed)
            && self.samples_to_isolate_dna == SampleStatus::Received;
        if full {
            EnrollmentStatus::FullParticipant
        } else {
            EnrollmentStatus::Member
        }
    }

    pub fn update_enrollment_status(&mut self, baseline_module_count: i32) {
        self.enrollment_status = self.calculate_enrollment_status(baseline_module_count);
    }
}

/// Enrollment inputs accepted on `PUT .../Summary`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryUpdate {
    #[serde(default)]
    pub consent_for_study_enrollment: Option<QuestionnaireStatus>,
    #[serde(default)]
    pub consent_for_electronic_health_records: Option<QuestionnaireStatus>,
    #[serde(default, rename = "numCompletedBaselinePPIModules")]
    pub num_completed_baseline_ppi_modules: Option<i32>,
    #[serde(default, rename = "samplesToIsolateDNA")]
    pub samples_to_isolate_dna: Option<SampleStatus>,
    #[serde(default)]
    pub biospecimen_collected_site_id: Option<i64>,
}

impl SummaryUpdate {
    pub fn apply(&self, summary: &mut ParticipantSummary) {
        if let Some(status) = self.consent_for_study_enrollment {
            summary.consent_for_study_enrollment = status;
        }
        if let Some(status) = self.consent_for_electronic_health_records {
            summary.consent_for_electronic_health_records = status;
        }
        if let Some(count) = self.num_completed_baseline_ppi_modules {
            summary.num_completed_baseline_ppi_modules = count;
        }
        if let Some(status) = self.samples_to_isolate_dna {
            summary.samples_to_isolate_dna = status;
        }
        if let Some(site) = self.biospecimen_collected_site_id {
            summary.biospecimen_collected_site_id = Some(site);
        }
    }
}
