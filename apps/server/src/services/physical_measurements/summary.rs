//! Physical measurements rollup onto the participant summary

use chrono::{DateTime, Utc};

use crate::{
    db::StoreTransaction,
    models::{
        format_participant_id, ParticipantSummary, PhysicalMeasurements,
        PhysicalMeasurementsStatus,
    },
    Error, Result,
};

/// Copy the measurement state implied by `record` onto `summary`.
///
/// `existing` holds the participant's stored records; for a patch it already contains
/// the patched version of `record`.
pub fn apply_rollup(
    summary: &mut ParticipantSummary,
    record: &PhysicalMeasurements,
    existing: &[PhysicalMeasurements],
) {
    let finalized = existing.iter().filter(|pm| pm.finalized.is_some());
    let has_uncancelled = finalized.clone().any(|pm| !pm.is_cancelled());

    if !record.is_cancelled() {
        summary.physical_measurements_status = Some(PhysicalMeasurementsStatus::Completed);
        summary.physical_measurements_time = Some(record.created);
        summary.physical_measurements_finalized_time = record.finalized;
        summary.physical_measurements_created_site_id = record.created_site_id;
        summary.physical_measurements_finalized_site_id = record.finalized_site_id;
    } else if !has_uncancelled {
        summary.physical_measurements_status = Some(PhysicalMeasurementsStatus::Cancelled);
        summary.physical_measurements_time = None;
    } else if let Some(latest) = finalized.max_by_key(|pm| pm.finalized) {
        summary.physical_measurements_finalized_time = latest.finalized;
        summary.physical_measurements_time = Some(latest.created);
        summary.physical_measurements_created_site_id = latest.created_site_id;
        summary.physical_measurements_finalized_site_id = latest.finalized_site_id;
    }
}

/// Lock the participant and summary, refuse withdrawn participants and roll `record` up
pub async fn update_participant_summary(
    tx: &mut dyn StoreTransaction,
    now: DateTime<Utc>,
    baseline_module_count: i32,
    record: &PhysicalMeasurements,
) -> Result<ParticipantSummary> {
    let participant_id = record.participant_id;
    let external_id = format_participant_id(participant_id);

    if tx.get_participant(participant_id, true).await?.is_none() {
        return Err(Error::BadRequest(format!(
            "Can't submit physical measurements for unknown participant {external_id}"
        )));
    }
    let mut summary = tx.get_summary(participant_id, true).await?.ok_or_else(|| {
        Error::BadRequest(format!(
            "Can't submit physical measurements for participant {external_id} without consent"
        ))
    })?;
    if summary.is_withdrawn() {
        return Err(Error::Forbidden(format!(
            "Participant {external_id} has withdrawn"
        )));
    }

    summary.last_modified = now;
    let existing = tx
        .list_physical_measurements_for_participant(participant_id)
        .await?;
    apply_rollup(&mut summary, record, &existing);
    summary.update_enrollment_status(baseline_module_count);
    tx.upsert_summary(&summary).await?;
    Ok(summary)
}
