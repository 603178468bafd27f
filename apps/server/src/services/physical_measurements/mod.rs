//! Physical measurements service
//!
//! Insert, read, cancel/restore, the sync feed and the maintenance jobs over stored
//! documents. Each public operation runs in a single store transaction.

pub mod distinct;
pub mod ids;
pub mod parser;
pub mod patch;
pub mod summary;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rdr_fhir_models::FhirDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::{
    clock::Clock,
    config::{EnrollmentConfig, SyncConfig},
    db::{Store, StoreTransaction},
    metrics::{
        MEASUREMENTS_PER_RECORD, PHYSICAL_MEASUREMENTS_INSERTS_TOTAL,
        PHYSICAL_MEASUREMENTS_PATCHES_TOTAL,
    },
    models::{format_participant_id, PhysicalMeasurements},
    services::{
        participants::{add_missing_hpo_from_site, validate_participant_id, validate_participant_reference},
        random_id,
    },
    Error, Result,
};

pub use distinct::{distinct_measurements_json, handle_measurement, MeasurementMap};
pub use ids::{make_measurement_id, set_measurement_ids};
pub use parser::{parse_document, ParsedDocument};
pub use patch::{PatchAction, PatchRequest};

const MAX_ID_ATTEMPTS: usize = 20;
const PHYSICAL_MEASUREMENTS_REFERENCE: &str = "PhysicalMeasurements";

/// One page of the sync feed
#[derive(Debug, Clone)]
pub struct SyncPage {
    pub records: Vec<PhysicalMeasurements>,
    /// Present when more records remain
    pub next_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SyncToken {
    after: i64,
}

pub fn encode_sync_token(after: i64) -> Result<String> {
    let token = serde_json::to_vec(&SyncToken { after })
        .map_err(|e| Error::Internal(format!("Failed to encode sync token: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(token))
}

pub fn decode_sync_token(token: &str) -> Result<i64> {
    let invalid = || Error::BadRequest(format!("Invalid continuation token: {token}"));
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let token: SyncToken = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    Ok(token.after)
}

/// Parse a stored or submitted document into an unsaved record for `participant_id`
fn record_from_document(
    participant_id: i64,
    resource: &JsonValue,
) -> Result<(PhysicalMeasurements, ParsedDocument)> {
    let mut parsed = parse_document(resource)?;
    let record = PhysicalMeasurements {
        participant_id,
        resource: resource.clone(),
        measurements: std::mem::take(&mut parsed.measurements),
        created_username: parsed.created_username.clone(),
        finalized_username: parsed.finalized_username.clone(),
        ..Default::default()
    };
    Ok((record, parsed))
}

/// `Location/<google group>` to a site id; malformed or unknown locations resolve to none
async fn resolve_location(
    tx: &mut dyn StoreTransaction,
    location: Option<&str>,
) -> Result<Option<i64>> {
    let Some(group) = location.and_then(parser::location_google_group) else {
        return Ok(None);
    };
    match tx.get_site_by_google_group(group).await? {
        Some(site) => Ok(Some(site.site_id)),
        None => {
            tracing::warn!(google_group = group, "Unknown site");
            Ok(None)
        }
    }
}

async fn unused_physical_measurements_id(tx: &mut dyn StoreTransaction) -> Result<i64> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = random_id();
        if !tx.physical_measurements_id_exists(id).await? {
            return Ok(id);
        }
    }
    Err(Error::Internal(
        "Could not allocate an unused physical measurements id".to_string(),
    ))
}

pub struct PhysicalMeasurementsService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    baseline_module_count: i32,
    sync: SyncConfig,
}

impl PhysicalMeasurementsService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        enrollment: &EnrollmentConfig,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            store,
            clock,
            baseline_module_count: enrollment.baseline_ppi_module_count,
            sync: sync.clone(),
        }
    }

    /// Store a submitted document.
    ///
    /// A document identical to one already stored for the participant returns the stored
    /// record instead of creating a new one.
    pub async fn insert(&self, participant_id: i64, resource: JsonValue) -> Result<PhysicalMeasurements> {
        let has_entries = resource
            .get("entry")
            .and_then(JsonValue::as_array)
            .is_some_and(|entries| !entries.is_empty());
        if !has_entries {
            return Err(Error::BadRequest(
                "Physical measurements document has no entries".to_string(),
            ));
        }

        let (mut record, parsed) = record_from_document(participant_id, &resource)?;
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        record.created_site_id = resolve_location(tx.as_mut(), parsed.created_location.as_deref()).await?;
        record.finalized_site_id =
            resolve_location(tx.as_mut(), parsed.finalized_location.as_deref()).await?;
        record.log_position_id = tx.next_log_position().await?;
        record.is_final = true;
        record.created = now;

        let first = resource.pointer("/entry/0/resource").cloned().unwrap_or(JsonValue::Null);
        if let Some(date) = first.get("date").and_then(JsonValue::as_str) {
            record.finalized = Some(FhirDateTime::parse(date)?.to_utc());
        }

        let mut is_amendment = false;
        let extensions = first.get("extension").and_then(JsonValue::as_array);
        for extension in extensions.into_iter().flatten() {
            let url = extension.get("url").and_then(JsonValue::as_str);
            if !parser::is_known_extension(url) {
                tracing::info!(url = ?url, "Ignoring unsupported extension for PhysicalMeasurements");
                continue;
            }
            if url == Some(parser::AMENDMENT_URL) {
                self.update_amended(tx.as_mut(), &mut record, extension).await?;
                is_amendment = true;
                break;
            }
        }

        let summary = summary::update_participant_summary(
            tx.as_mut(),
            now,
            self.baseline_module_count,
            &record,
        )
        .await?;

        let existing = tx
            .list_physical_measurements_for_participant(participant_id)
            .await?;
        if let Some(duplicate) = existing.into_iter().find(|pm| pm.equivalent_to(&record)) {
            tx.commit().await?;
            PHYSICAL_MEASUREMENTS_INSERTS_TOTAL
                .with_label_values(&["duplicate"])
                .inc();
            tracing::info!(
                participant_id = %format_participant_id(participant_id),
                physical_measurements_id = duplicate.physical_measurements_id,
                "Duplicate physical measurements submitted; returning stored record"
            );
            return Ok(duplicate);
        }

        record.physical_measurements_id = unused_physical_measurements_id(tx.as_mut()).await?;
        set_measurement_ids(&mut record)?;
        if let Some(object) = record.resource.as_object_mut() {
            object.insert(
                "id".to_string(),
                json!(record.physical_measurements_id.to_string()),
            );
        }
        tx.insert_physical_measurements(&record).await?;

        if !is_amendment && summary.biospecimen_collected_site_id.is_none() {
            if let Some(site_id) = record.finalized_site_id {
                add_missing_hpo_from_site(tx.as_mut(), now, participant_id, site_id).await?;
            }
        }
        tx.commit().await?;

        let outcome = if is_amendment { "amendment" } else { "created" };
        PHYSICAL_MEASUREMENTS_INSERTS_TOTAL
            .with_label_values(&[outcome])
            .inc();
        MEASUREMENTS_PER_RECORD
            .with_label_values(&["insert"])
            .observe(record.measurement_count() as f64);
        tracing::info!(
            participant_id = %format_participant_id(participant_id),
            physical_measurements_id = record.physical_measurements_id,
            measurements = record.measurement_count(),
            amends = ?record.amended_measurements_id,
            "Physical measurements stored"
        );
        Ok(record)
    }

    /// Mark the referenced record amended and link the new record to it
    async fn update_amended(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &mut PhysicalMeasurements,
        extension: &JsonValue,
    ) -> Result<()> {
        let url = parser::AMENDMENT_URL;
        let value_reference = extension.get("valueReference").ok_or_else(|| {
            Error::BadRequest(format!("No valueReference in extension '{url}'."))
        })?;
        let reference = value_reference
            .get("reference")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::BadRequest(format!("No reference in extension '{url}'.")))?;

        let ref_id = match reference.split_once('/') {
            Some((PHYSICAL_MEASUREMENTS_REFERENCE, ref_id)) => ref_id,
            _ => {
                return Err(Error::BadRequest(format!(
                    "Bad reference type in extension '{url}': '{reference}'."
                )))
            }
        };
        let amended_id: i64 = ref_id
            .parse()
            .map_err(|_| Error::BadRequest(format!("Invalid ref id: '{ref_id}'")))?;

        let mut amended = tx
            .get_physical_measurements(amended_id, true)
            .await?
            .ok_or_else(|| {
                Error::BadRequest(format!(
                    "Amendment references unknown PhysicalMeasurement '{ref_id}'."
                ))
            })?;
        validate_participant_reference(tx, amended.participant_id).await?;

        if let Some(composition) = amended
            .resource
            .pointer_mut("/entry/0/resource")
            .and_then(JsonValue::as_object_mut)
        {
            composition.insert("status".to_string(), json!("amended"));
        }
        amended.is_final = false;
        tx.update_physical_measurements(&amended).await?;

        record.amended_measurements_id = Some(amended_id);
        Ok(())
    }

    /// One record with its measurements; it must belong to `participant_id`
    pub async fn get(&self, participant_id: i64, id: i64) -> Result<PhysicalMeasurements> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .get_physical_measurements(id, false)
            .await?
            .filter(|pm| pm.participant_id == participant_id)
            .ok_or_else(|| Error::NotFound(format!("PhysicalMeasurements {id} not found")))?;
        validate_participant_reference(tx.as_mut(), record.participant_id).await?;
        tx.rollback().await?;
        Ok(record)
    }

    pub async fn list_for_participant(&self, participant_id: i64) -> Result<Vec<PhysicalMeasurements>> {
        let mut tx = self.store.begin().await?;
        validate_participant_id(tx.as_mut(), participant_id).await?;
        let records = tx
            .list_physical_measurements_for_participant(participant_id)
            .await?;
        tx.rollback().await?;
        Ok(records)
    }

    /// Records of every participant in log order, withdrawn participants included
    pub async fn sync(&self, count: Option<usize>, token: Option<&str>) -> Result<SyncPage> {
        let count = count.unwrap_or(self.sync.default_page_size);
        if count == 0 || count > self.sync.max_page_size {
            return Err(Error::BadRequest(format!(
                "_count must be between 1 and {}",
                self.sync.max_page_size
            )));
        }
        let after = token.map(decode_sync_token).transpose()?.unwrap_or(0);

        let mut tx = self.store.begin().await?;
        let mut records = tx.list_physical_measurements_after(after, count + 1).await?;
        tx.rollback().await?;

        let next_token = if records.len() > count {
            records.truncate(count);
            records
                .last()
                .map(|last| encode_sync_token(last.log_position_id))
                .transpose()?
        } else {
            None
        };
        Ok(SyncPage { records, next_token })
    }

    /// Cancel or restore a record
    pub async fn patch(
        &self,
        participant_id: i64,
        id: i64,
        body: &JsonValue,
    ) -> Result<PhysicalMeasurements> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();

        let mut record = tx
            .get_physical_measurements(id, true)
            .await?
            .filter(|pm| pm.participant_id == participant_id)
            .ok_or_else(|| Error::NotFound(format!("PhysicalMeasurements {id} not found")))?;

        let request = patch::validate_patch(&record, body)?;
        let location = format!("{}{}", parser::LOCATION_PREFIX, request.site);
        let site_id = resolve_location(tx.as_mut(), Some(&location)).await?;

        patch::apply_patch(&mut record, &request, site_id, now);
        tracing::info!(
            author = %request.author,
            physical_measurements_id = id,
            "{} {} physical measurements {}",
            request.author,
            request.action.as_str(),
            id
        );
        patch::add_root_fields_to_resource(&mut record);
        tx.update_physical_measurements(&record).await?;
        summary::update_participant_summary(tx.as_mut(), now, self.baseline_module_count, &record)
            .await?;
        tx.commit().await?;

        PHYSICAL_MEASUREMENTS_PATCHES_TOTAL
            .with_label_values(&[request.action.as_str()])
            .inc();
        Ok(record)
    }

    /// Re-derive root audit fields and measurement rows from every stored document.
    ///
    /// Documents that no longer parse are logged and skipped. Returns the number of
    /// records rewritten.
    pub async fn backfill(&self) -> Result<usize> {
        let mut tx = self.store.begin().await?;
        let stored = tx.list_all_physical_measurements().await?;
        let mut updated = 0;

        for existing in stored {
            let (mut parsed_record, parsed) =
                match record_from_document(existing.participant_id, &existing.resource) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(
                            physical_measurements_id = existing.physical_measurements_id,
                            error = %e,
                            "Could not parse stored physical measurements; skipping"
                        );
                        continue;
                    }
                };

            let mut record = existing;
            record.created_site_id =
                resolve_location(tx.as_mut(), parsed.created_location.as_deref()).await?;
            record.finalized_site_id =
                resolve_location(tx.as_mut(), parsed.finalized_location.as_deref()).await?;
            record.created_username = parsed_record.created_username.take();
            record.finalized_username = parsed_record.finalized_username.take();
            record.measurements = std::mem::take(&mut parsed_record.measurements);
            set_measurement_ids(&mut record)?;

            tx.update_physical_measurements(&record).await?;
            tx.replace_measurements(&record).await?;
            MEASUREMENTS_PER_RECORD
                .with_label_values(&["backfill"])
                .observe(record.measurement_count() as f64);
            updated += 1;
        }

        tx.commit().await?;
        tracing::info!(updated, "Backfilled physical measurements");
        Ok(updated)
    }

    /// Aggregate every stored document into the distinct measurement catalogue
    pub async fn distinct_measurements(&self) -> Result<MeasurementMap> {
        let mut tx = self.store.begin().await?;
        let stored = tx.list_all_physical_measurements().await?;
        tx.rollback().await?;

        let mut map = MeasurementMap::new();
        for record in stored {
            match parse_document(&record.resource) {
                Ok(parsed) => {
                    for measurement in &parsed.measurements {
                        handle_measurement(&mut map, measurement, &parsed.measurements)?;
                    }
                }
                Err(e) => tracing::error!(
                    physical_measurements_id = record.physical_measurements_id,
                    error = %e,
                    "Could not parse stored physical measurements"
                ),
            }
        }
        Ok(map)
    }

    pub async fn distinct_measurements_json(&self) -> Result<Vec<JsonValue>> {
        Ok(distinct_measurements_json(&self.distinct_measurements().await?))
    }
}
