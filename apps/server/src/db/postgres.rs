//! PostgreSQL store

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};
use std::collections::HashMap;
use std::time::Duration;

use super::traits::{QuestionnaireRows, Store, StoreTransaction};
use crate::{
    config::DatabaseConfig,
    models::{
        enums::parse_column, Hpo, Measurement, Organization, Participant, ParticipantSummary,
        PhysicalMeasurements, QuestionRow, QuestionnaireGroupRow, QuestionnaireRow, Site,
    },
    Error, Result,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_url(config, &config.url).await
    }

    pub async fn connect_url(config: &DatabaseConfig, url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min_size)
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(url)
            .await
            .map_err(Error::Database)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

pub struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| {
            Error::Internal("Transaction already committed or rolled back".to_string())
        })
    }
}

const PARTICIPANT_COLUMNS: &str = "participant_id, biobank_id, version, hpo_id, organization_id, \
     site_id, provider_link, withdrawal_status, sign_up_time, last_modified";

const SUMMARY_COLUMNS: &str = "participant_id, biobank_id, hpo_id, organization_id, site_id, \
     withdrawal_status, enrollment_status, consent_for_study_enrollment, \
     consent_for_electronic_health_records, num_completed_baseline_ppi_modules, \
     samples_to_isolate_dna, biospecimen_collected_site_id, physical_measurements_status, \
     physical_measurements_time, physical_measurements_finalized_time, \
     physical_measurements_created_site_id, physical_measurements_finalized_site_id, last_modified";

const SITE_COLUMNS: &str = "site_id, site_name, google_group, mayolink_client_number, \
     organization_id, hpo_id, site_status, launch_date, notes, directions, \
     physical_location_name, address_1, address_2, city, state, zip_code, phone_number, \
     admin_emails, link, latitude, longitude";

const PM_COLUMNS: &str = "physical_measurements_id, participant_id, created, resource, final, \
     amended_measurements_id, log_position_id, finalized, created_site_id, created_username, \
     finalized_site_id, finalized_username, status, reason, cancelled_username, \
     cancelled_site_id, cancelled_time";

const MEASUREMENT_COLUMNS: &str = "measurement_id, physical_measurements_id, parent_id, \
     code_system, code_value, measurement_time, body_site_code_system, body_site_code_value, \
     value_string, value_decimal, value_unit, value_code_system, value_code_value, value_datetime";

fn required_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let text: String = row.try_get(column)?;
    text.parse::<T>().map_err(Error::Internal)
}

fn participant_from_row(row: &PgRow) -> Result<Participant> {
    Ok(Participant {
        participant_id: row.try_get("participant_id")?,
        biobank_id: row.try_get("biobank_id")?,
        version: row.try_get("version")?,
        hpo_id: row.try_get("hpo_id")?,
        organization_id: row.try_get("organization_id")?,
        site_id: row.try_get("site_id")?,
        provider_link: row.try_get("provider_link")?,
        withdrawal_status: required_column(row, "withdrawal_status")?,
        sign_up_time: row.try_get("sign_up_time")?,
        last_modified: row.try_get("last_modified")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<ParticipantSummary> {
    Ok(ParticipantSummary {
        participant_id: row.try_get("participant_id")?,
        biobank_id: row.try_get("biobank_id")?,
        hpo_id: row.try_get("hpo_id")?,
        organization_id: row.try_get("organization_id")?,
        site_id: row.try_get("site_id")?,
        withdrawal_status: required_column(row, "withdrawal_status")?,
        enrollment_status: required_column(row, "enrollment_status")?,
        consent_for_study_enrollment: required_column(row, "consent_for_study_enrollment")?,
        consent_for_electronic_health_records: required_column(
            row,
            "consent_for_electronic_health_records",
        )?,
        num_completed_baseline_ppi_modules: row.try_get("num_completed_baseline_ppi_modules")?,
        samples_to_isolate_dna: required_column(row, "samples_to_isolate_dna")?,
        biospecimen_collected_site_id: row.try_get("biospecimen_collected_site_id")?,
        physical_measurements_status: parse_column(row.try_get("physical_measurements_status")?)?,
        physical_measurements_time: row.try_get("physical_measurements_time")?,
        physical_measurements_finalized_time: row.try_get("physical_measurements_finalized_time")?,
        physical_measurements_created_site_id: row
            .try_get("physical_measurements_created_site_id")?,
        physical_measurements_finalized_site_id: row
            .try_get("physical_measurements_finalized_site_id")?,
        last_modified: row.try_get("last_modified")?,
    })
}

fn hpo_from_row(row: &PgRow) -> Result<Hpo> {
    Ok(Hpo {
        hpo_id: row.try_get("hpo_id")?,
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        organization_type: parse_column(row.try_get("organization_type")?)?,
    })
}

fn organization_from_row(row: &PgRow) -> Result<Organization> {
    Ok(Organization {
        organization_id: row.try_get("organization_id")?,
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        hpo_id: row.try_get("hpo_id")?,
    })
}

fn site_from_row(row: &PgRow) -> Result<Site> {
    Ok(Site {
        site_id: row.try_get("site_id")?,
        site_name: row.try_get("site_name")?,
        google_group: row.try_get("google_group")?,
        mayolink_client_number: row.try_get("mayolink_client_number")?,
        organization_id: row.try_get("organization_id")?,
        hpo_id: row.try_get("hpo_id")?,
        site_status: parse_column(row.try_get("site_status")?)?,
        launch_date: row.try_get("launch_date")?,
        notes: row.try_get("notes")?,
        directions: row.try_get("directions")?,
        physical_location_name: row.try_get("physical_location_name")?,
        address_1: row.try_get("address_1")?,
        address_2: row.try_get("address_2")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip_code: row.try_get("zip_code")?,
        phone_number: row.try_get("phone_number")?,
        admin_emails: row.try_get("admin_emails")?,
        link: row.try_get("link")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

fn physical_measurements_from_row(row: &PgRow) -> Result<PhysicalMeasurements> {
    let id: i64 = row.try_get("physical_measurements_id")?;
    let resource_text: String = row.try_get("resource")?;
    let resource = serde_json::from_str(&resource_text).map_err(|e| {
        Error::Internal(format!("Stored resource for physical measurements {id} is not JSON: {e}"))
    })?;

    Ok(PhysicalMeasurements {
        physical_measurements_id: id,
        participant_id: row.try_get("participant_id")?,
        created: row.try_get("created")?,
        resource,
        is_final: row.try_get("final")?,
        amended_measurements_id: row.try_get("amended_measurements_id")?,
        log_position_id: row.try_get("log_position_id")?,
        finalized: row.try_get("finalized")?,
        created_site_id: row.try_get("created_site_id")?,
        created_username: row.try_get("created_username")?,
        finalized_site_id: row.try_get("finalized_site_id")?,
        finalized_username: row.try_get("finalized_username")?,
        status: parse_column(row.try_get("status")?)?,
        reason: row.try_get("reason")?,
        cancelled_username: row.try_get("cancelled_username")?,
        cancelled_site_id: row.try_get("cancelled_site_id")?,
        cancelled_time: row.try_get("cancelled_time")?,
        measurements: Vec::new(),
    })
}

fn measurement_from_row(row: &PgRow) -> Result<(Option<i64>, Measurement)> {
    let parent_id: Option<i64> = row.try_get("parent_id")?;
    let measurement = Measurement {
        measurement_id: row.try_get("measurement_id")?,
        physical_measurements_id: row.try_get("physical_measurements_id")?,
        code_system: row.try_get("code_system")?,
        code_value: row.try_get("code_value")?,
        measurement_time: row.try_get::<NaiveDateTime, _>("measurement_time")?,
        body_site_code_system: row.try_get("body_site_code_system")?,
        body_site_code_value: row.try_get("body_site_code_value")?,
        value_string: row.try_get("value_string")?,
        value_decimal: row.try_get::<Option<Decimal>, _>("value_decimal")?,
        value_unit: row.try_get("value_unit")?,
        value_code_system: row.try_get("value_code_system")?,
        value_code_value: row.try_get("value_code_value")?,
        value_date_time: row.try_get("value_datetime")?,
        measurements: Vec::new(),
        qualifiers: Vec::new(),
    };
    Ok((parent_id, measurement))
}

fn resource_text(record: &PhysicalMeasurements) -> Result<String> {
    serde_json::to_string(&record.resource)
        .map_err(|e| Error::Internal(format!("Failed to serialize resource: {e}")))
}

impl PostgresTransaction {
    async fn write_participant_history(&mut self, participant: &Participant) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(&format!(
            "INSERT INTO participant_history ({PARTICIPANT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(participant.participant_id)
        .bind(participant.biobank_id)
        .bind(participant.version)
        .bind(participant.hpo_id)
        .bind(participant.organization_id)
        .bind(participant.site_id)
        .bind(&participant.provider_link)
        .bind(participant.withdrawal_status.as_str())
        .bind(participant.sign_up_time)
        .bind(participant.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn insert_measurement_rows(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let tx = self.tx_mut()?;
        let insert = format!(
            "INSERT INTO measurement ({MEASUREMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );

        for measurement in &record.measurements {
            let rows = std::iter::once((None, measurement)).chain(
                measurement
                    .measurements
                    .iter()
                    .map(|child| (Some(measurement.measurement_id), child)),
            );
            for (parent_id, m) in rows {
                sqlx::query(&insert)
                    .bind(m.measurement_id)
                    .bind(record.physical_measurements_id)
                    .bind(parent_id)
                    .bind(&m.code_system)
                    .bind(&m.code_value)
                    .bind(m.measurement_time)
                    .bind(&m.body_site_code_system)
                    .bind(&m.body_site_code_value)
                    .bind(&m.value_string)
                    .bind(m.value_decimal)
                    .bind(&m.value_unit)
                    .bind(&m.value_code_system)
                    .bind(&m.value_code_value)
                    .bind(m.value_date_time)
                    .execute(&mut **tx)
                    .await
                    .map_err(Error::Database)?;
            }
        }

        for measurement in &record.measurements {
            for qualifier_id in record.qualifier_ids(measurement) {
                sqlx::query(
                    "INSERT INTO measurement_to_qualifier (measurement_id, qualifier_id)
                     VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(measurement.measurement_id)
                .bind(qualifier_id)
                .execute(&mut **tx)
                .await
                .map_err(Error::Database)?;
            }
        }
        Ok(())
    }

    async fn load_measurements(&mut self, record: &mut PhysicalMeasurements) -> Result<()> {
        let tx = self.tx_mut()?;
        let rows = sqlx::query(&format!(
            "SELECT {MEASUREMENT_COLUMNS}
             FROM measurement
             WHERE physical_measurements_id = $1
             ORDER BY measurement_id"
        ))
        .bind(record.physical_measurements_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let links = sqlx::query(
            "SELECT q.measurement_id, q.qualifier_id
             FROM measurement_to_qualifier q
             JOIN measurement m ON m.measurement_id = q.measurement_id
             WHERE m.physical_measurements_id = $1
             ORDER BY q.measurement_id, q.qualifier_id",
        )
        .bind(record.physical_measurements_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let mut top_level: Vec<Measurement> = Vec::new();
        let mut children: Vec<(i64, Measurement)> = Vec::new();
        for row in &rows {
            match measurement_from_row(row)? {
                (None, m) => top_level.push(m),
                (Some(parent), m) => children.push((parent, m)),
            }
        }

        let position: HashMap<i64, usize> = top_level
            .iter()
            .enumerate()
            .map(|(i, m)| (m.measurement_id, i))
            .collect();

        for (parent, child) in children {
            if let Some(&i) = position.get(&parent) {
                top_level[i].measurements.push(child);
            }
        }

        for row in &links {
            let measurement_id: i64 = row.try_get("measurement_id")?;
            let qualifier_id: i64 = row.try_get("qualifier_id")?;
            if let (Some(&m), Some(&q)) = (position.get(&measurement_id), position.get(&qualifier_id))
            {
                top_level[m].qualifiers.push(q);
            }
        }

        record.measurements = top_level;
        Ok(())
    }

    async fn fetch_roots(&mut self, sql: String, binds: &[i64]) -> Result<Vec<PhysicalMeasurements>> {
        let tx = self.tx_mut()?;
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&mut **tx).await.map_err(Error::Database)?;
        rows.iter().map(physical_measurements_from_row).collect()
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already committed".to_string()))?;
        tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already rolled back".to_string()))?;
        tx.rollback().await.map_err(Error::Database)
    }

    async fn get_participant(
        &mut self,
        participant_id: i64,
        for_update: bool,
    ) -> Result<Option<Participant>> {
        let tx = self.tx_mut()?;
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participant WHERE participant_id = $1{lock}"
        ))
        .bind(participant_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn participant_id_exists(&mut self, participant_id: i64) -> Result<bool> {
        let tx = self.tx_mut()?;
        let row = sqlx::query("SELECT 1 FROM participant WHERE participant_id = $1")
            .bind(participant_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(row.is_some())
    }

    async fn biobank_id_exists(&mut self, biobank_id: i64) -> Result<bool> {
        let tx = self.tx_mut()?;
        let row = sqlx::query("SELECT 1 FROM participant WHERE biobank_id = $1")
            .bind(biobank_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(row.is_some())
    }

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(&format!(
            "INSERT INTO participant ({PARTICIPANT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(participant.participant_id)
        .bind(participant.biobank_id)
        .bind(participant.version)
        .bind(participant.hpo_id)
        .bind(participant.organization_id)
        .bind(participant.site_id)
        .bind(&participant.provider_link)
        .bind(participant.withdrawal_status.as_str())
        .bind(participant.sign_up_time)
        .bind(participant.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        self.write_participant_history(participant).await
    }

    async fn update_participant(&mut self, participant: &Participant) -> Result<()> {
        let tx = self.tx_mut()?;
        let updated = sqlx::query(
            "UPDATE participant
             SET version = $2, hpo_id = $3, organization_id = $4, site_id = $5,
                 provider_link = $6, withdrawal_status = $7, last_modified = $8
             WHERE participant_id = $1",
        )
        .bind(participant.participant_id)
        .bind(participant.version)
        .bind(participant.hpo_id)
        .bind(participant.organization_id)
        .bind(participant.site_id)
        .bind(&participant.provider_link)
        .bind(participant.withdrawal_status.as_str())
        .bind(participant.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Participant {} not found",
                participant.participant_id
            )));
        }
        self.write_participant_history(participant).await
    }

    async fn get_participant_history(&mut self, participant_id: i64) -> Result<Vec<Participant>> {
        let tx = self.tx_mut()?;
        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participant_history
             WHERE participant_id = $1 ORDER BY version"
        ))
        .bind(participant_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(participant_from_row).collect()
    }

    async fn get_summary(
        &mut self,
        participant_id: i64,
        for_update: bool,
    ) -> Result<Option<ParticipantSummary>> {
        let tx = self.tx_mut()?;
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM participant_summary WHERE participant_id = $1{lock}"
        ))
        .bind(participant_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(summary_from_row).transpose()
    }

    async fn upsert_summary(&mut self, summary: &ParticipantSummary) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(&format!(
            "INSERT INTO participant_summary ({SUMMARY_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT (participant_id) DO UPDATE SET
                 hpo_id = EXCLUDED.hpo_id,
                 organization_id = EXCLUDED.organization_id,
                 site_id = EXCLUDED.site_id,
                 withdrawal_status = EXCLUDED.withdrawal_status,
                 enrollment_status = EXCLUDED.enrollment_status,
                 consent_for_study_enrollment = EXCLUDED.consent_for_study_enrollment,
                 consent_for_electronic_health_records = EXCLUDED.consent_for_electronic_health_records,
                 num_completed_baseline_ppi_modules = EXCLUDED.num_completed_baseline_ppi_modules,
                 samples_to_isolate_dna = EXCLUDED.samples_to_isolate_dna,
                 biospecimen_collected_site_id = EXCLUDED.biospecimen_collected_site_id,
                 physical_measurements_status = EXCLUDED.physical_measurements_status,
                 physical_measurements_time = EXCLUDED.physical_measurements_time,
                 physical_measurements_finalized_time = EXCLUDED.physical_measurements_finalized_time,
                 physical_measurements_created_site_id = EXCLUDED.physical_measurements_created_site_id,
                 physical_measurements_finalized_site_id = EXCLUDED.physical_measurements_finalized_site_id,
                 last_modified = EXCLUDED.last_modified"
        ))
        .bind(summary.participant_id)
        .bind(summary.biobank_id)
        .bind(summary.hpo_id)
        .bind(summary.organization_id)
        .bind(summary.site_id)
        .bind(summary.withdrawal_status.as_str())
        .bind(summary.enrollment_status.as_str())
        .bind(summary.consent_for_study_enrollment.as_str())
        .bind(summary.consent_for_electronic_health_records.as_str())
        .bind(summary.num_completed_baseline_ppi_modules)
        .bind(summary.samples_to_isolate_dna.as_str())
        .bind(summary.biospecimen_collected_site_id)
        .bind(summary.physical_measurements_status.map(|s| s.as_str()))
        .bind(summary.physical_measurements_time)
        .bind(summary.physical_measurements_finalized_time)
        .bind(summary.physical_measurements_created_site_id)
        .bind(summary.physical_measurements_finalized_site_id)
        .bind(summary.last_modified)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_hpos(&mut self) -> Result<Vec<Hpo>> {
        let tx = self.tx_mut()?;
        let rows = sqlx::query(
            "SELECT hpo_id, name, display_name, organization_type FROM hpo ORDER BY hpo_id",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(hpo_from_row).collect()
    }

    async fn get_hpo(&mut self, hpo_id: i64) -> Result<Option<Hpo>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "SELECT hpo_id, name, display_name, organization_type FROM hpo WHERE hpo_id = $1",
        )
        .bind(hpo_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(hpo_from_row).transpose()
    }

    async fn get_hpo_by_name(&mut self, name: &str) -> Result<Option<Hpo>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "SELECT hpo_id, name, display_name, organization_type FROM hpo WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(hpo_from_row).transpose()
    }

    async fn insert_hpo(&mut self, hpo: &Hpo) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "INSERT INTO hpo (hpo_id, name, display_name, organization_type)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(hpo.hpo_id)
        .bind(&hpo.name)
        .bind(&hpo.display_name)
        .bind(hpo.organization_type.map(|t| t.as_str()))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_hpo(&mut self, hpo: &Hpo) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "UPDATE hpo SET name = $2, display_name = $3, organization_type = $4
             WHERE hpo_id = $1",
        )
        .bind(hpo.hpo_id)
        .bind(&hpo.name)
        .bind(&hpo.display_name)
        .bind(hpo.organization_type.map(|t| t.as_str()))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_organizations(&mut self) -> Result<Vec<Organization>> {
        let tx = self.tx_mut()?;
        let rows = sqlx::query(
            "SELECT organization_id, external_id, display_name, hpo_id
             FROM organization ORDER BY organization_id",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(organization_from_row).collect()
    }

    async fn get_organization(&mut self, organization_id: i64) -> Result<Option<Organization>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "SELECT organization_id, external_id, display_name, hpo_id
             FROM organization WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn get_organization_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Organization>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "SELECT organization_id, external_id, display_name, hpo_id
             FROM organization WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn insert_organization(&mut self, organization: &Organization) -> Result<i64> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "INSERT INTO organization (external_id, display_name, hpo_id)
             VALUES ($1, $2, $3)
             RETURNING organization_id",
        )
        .bind(&organization.external_id)
        .bind(&organization.display_name)
        .bind(organization.hpo_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(row.try_get("organization_id")?)
    }

    async fn update_organization(&mut self, organization: &Organization) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "UPDATE organization SET external_id = $2, display_name = $3, hpo_id = $4
             WHERE organization_id = $1",
        )
        .bind(organization.organization_id)
        .bind(&organization.external_id)
        .bind(&organization.display_name)
        .bind(organization.hpo_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_sites(&mut self) -> Result<Vec<Site>> {
        let tx = self.tx_mut()?;
        let rows = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM site ORDER BY site_id"))
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(site_from_row).collect()
    }

    async fn get_site(&mut self, site_id: i64) -> Result<Option<Site>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM site WHERE site_id = $1"))
            .bind(site_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(site_from_row).transpose()
    }

    async fn get_site_by_google_group(&mut self, google_group: &str) -> Result<Option<Site>> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(&format!(
            "SELECT {SITE_COLUMNS} FROM site WHERE google_group = $1"
        ))
        .bind(google_group)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(site_from_row).transpose()
    }

    async fn insert_site(&mut self, site: &Site) -> Result<i64> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "INSERT INTO site (site_name, google_group, mayolink_client_number, organization_id,
                 hpo_id, site_status, launch_date, notes, directions, physical_location_name,
                 address_1, address_2, city, state, zip_code, phone_number, admin_emails, link,
                 latitude, longitude)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                 $17, $18, $19, $20)
             RETURNING site_id",
        )
        .bind(&site.site_name)
        .bind(&site.google_group)
        .bind(site.mayolink_client_number)
        .bind(site.organization_id)
        .bind(site.hpo_id)
        .bind(site.site_status.map(|s| s.as_str()))
        .bind(site.launch_date)
        .bind(&site.notes)
        .bind(&site.directions)
        .bind(&site.physical_location_name)
        .bind(&site.address_1)
        .bind(&site.address_2)
        .bind(&site.city)
        .bind(&site.state)
        .bind(&site.zip_code)
        .bind(&site.phone_number)
        .bind(&site.admin_emails)
        .bind(&site.link)
        .bind(site.latitude)
        .bind(site.longitude)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(row.try_get("site_id")?)
    }

    async fn update_site(&mut self, site: &Site) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "UPDATE site SET site_name = $2, google_group = $3, mayolink_client_number = $4,
                 organization_id = $5, hpo_id = $6, site_status = $7, launch_date = $8,
                 notes = $9, directions = $10, physical_location_name = $11, address_1 = $12,
                 address_2 = $13, city = $14, state = $15, zip_code = $16, phone_number = $17,
                 admin_emails = $18, link = $19, latitude = $20, longitude = $21
             WHERE site_id = $1",
        )
        .bind(site.site_id)
        .bind(&site.site_name)
        .bind(&site.google_group)
        .bind(site.mayolink_client_number)
        .bind(site.organization_id)
        .bind(site.hpo_id)
        .bind(site.site_status.map(|s| s.as_str()))
        .bind(site.launch_date)
        .bind(&site.notes)
        .bind(&site.directions)
        .bind(&site.physical_location_name)
        .bind(&site.address_1)
        .bind(&site.address_2)
        .bind(&site.city)
        .bind(&site.state)
        .bind(&site.zip_code)
        .bind(&site.phone_number)
        .bind(&site.admin_emails)
        .bind(&site.link)
        .bind(site.latitude)
        .bind(site.longitude)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn next_log_position(&mut self) -> Result<i64> {
        let tx = self.tx_mut()?;
        let row = sqlx::query("INSERT INTO log_position DEFAULT VALUES RETURNING log_position_id")
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(row.try_get("log_position_id")?)
    }

    async fn physical_measurements_id_exists(&mut self, id: i64) -> Result<bool> {
        let tx = self.tx_mut()?;
        let row = sqlx::query(
            "SELECT 1 FROM physical_measurements WHERE physical_measurements_id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(row.is_some())
    }

    async fn get_physical_measurements(
        &mut self,
        id: i64,
        for_update: bool,
    ) -> Result<Option<PhysicalMeasurements>> {
        let tx = self.tx_mut()?;
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {PM_COLUMNS} FROM physical_measurements
             WHERE physical_measurements_id = $1{lock}"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = physical_measurements_from_row(&row)?;
        self.load_measurements(&mut record).await?;
        Ok(Some(record))
    }

    async fn list_physical_measurements_for_participant(
        &mut self,
        participant_id: i64,
    ) -> Result<Vec<PhysicalMeasurements>> {
        self.fetch_roots(
            format!(
                "SELECT {PM_COLUMNS} FROM physical_measurements
                 WHERE participant_id = $1 ORDER BY log_position_id"
            ),
            &[participant_id],
        )
        .await
    }

    async fn list_all_physical_measurements(&mut self) -> Result<Vec<PhysicalMeasurements>> {
        self.fetch_roots(
            format!("SELECT {PM_COLUMNS} FROM physical_measurements ORDER BY log_position_id"),
            &[],
        )
        .await
    }

    async fn list_physical_measurements_after(
        &mut self,
        after: i64,
        limit: usize,
    ) -> Result<Vec<PhysicalMeasurements>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.fetch_roots(
            format!(
                "SELECT {PM_COLUMNS} FROM physical_measurements
                 WHERE log_position_id > $1 ORDER BY log_position_id LIMIT $2"
            ),
            &[after, limit],
        )
        .await
    }

    async fn insert_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let resource = resource_text(record)?;
        let tx = self.tx_mut()?;
        sqlx::query(&format!(
            "INSERT INTO physical_measurements ({PM_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(record.physical_measurements_id)
        .bind(record.participant_id)
        .bind(record.created)
        .bind(resource)
        .bind(record.is_final)
        .bind(record.amended_measurements_id)
        .bind(record.log_position_id)
        .bind(record.finalized)
        .bind(record.created_site_id)
        .bind(&record.created_username)
        .bind(record.finalized_site_id)
        .bind(&record.finalized_username)
        .bind(record.status.map(|s| s.as_str()))
        .bind(&record.reason)
        .bind(&record.cancelled_username)
        .bind(record.cancelled_site_id)
        .bind(record.cancelled_time)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        self.insert_measurement_rows(record).await
    }

    async fn update_physical_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let resource = resource_text(record)?;
        let tx = self.tx_mut()?;
        let updated = sqlx::query(
            "UPDATE physical_measurements
             SET resource = $2, final = $3, amended_measurements_id = $4, finalized = $5,
                 created_site_id = $6, created_username = $7, finalized_site_id = $8,
                 finalized_username = $9, status = $10, reason = $11,
                 cancelled_username = $12, cancelled_site_id = $13, cancelled_time = $14
             WHERE physical_measurements_id = $1",
        )
        .bind(record.physical_measurements_id)
        .bind(resource)
        .bind(record.is_final)
        .bind(record.amended_measurements_id)
        .bind(record.finalized)
        .bind(record.created_site_id)
        .bind(&record.created_username)
        .bind(record.finalized_site_id)
        .bind(&record.finalized_username)
        .bind(record.status.map(|s| s.as_str()))
        .bind(&record.reason)
        .bind(&record.cancelled_username)
        .bind(record.cancelled_site_id)
        .bind(record.cancelled_time)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Physical measurements {} not found",
                record.physical_measurements_id
            )));
        }
        Ok(())
    }

    async fn replace_measurements(&mut self, record: &PhysicalMeasurements) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query(
            "DELETE FROM measurement_to_qualifier
             WHERE measurement_id IN (
                 SELECT measurement_id FROM measurement WHERE physical_measurements_id = $1
             )",
        )
        .bind(record.physical_measurements_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        for children_first in ["parent_id IS NOT NULL", "parent_id IS NULL"] {
            sqlx::query(&format!(
                "DELETE FROM measurement WHERE physical_measurements_id = $1 AND {children_first}"
            ))
            .bind(record.physical_measurements_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }

        self.insert_measurement_rows(record).await
    }

    async fn insert_questionnaire(
        &mut self,
        questionnaire: &QuestionnaireRow,
        groups: &[QuestionnaireGroupRow],
        questions: &[QuestionRow],
    ) -> Result<()> {
        let tx = self.tx_mut()?;
        sqlx::query("INSERT INTO questionnaire (questionnaire_id, resource) VALUES ($1, $2)")
            .bind(&questionnaire.questionnaire_id)
            .bind(&questionnaire.resource)
            .execute(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(format!(
                    "Questionnaire {} already exists",
                    questionnaire.questionnaire_id
                )),
                other => Error::Database(other),
            })?;

        for group in groups {
            sqlx::query(
                "INSERT INTO questionnaire_group (group_id, questionnaire_id, parent_id, ordinal, data)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&group.group_id)
            .bind(&group.questionnaire_id)
            .bind(&group.parent_id)
            .bind(group.ordinal)
            .bind(&group.data)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }

        for question in questions {
            sqlx::query(
                "INSERT INTO question (question_id, questionnaire_id, parent_id, ordinal, data)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&question.question_id)
            .bind(&question.questionnaire_id)
            .bind(&question.parent_id)
            .bind(question.ordinal)
            .bind(&question.data)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    async fn get_questionnaire(
        &mut self,
        questionnaire_id: &str,
    ) -> Result<Option<QuestionnaireRows>> {
        let tx = self.tx_mut()?;
        let Some(row) =
            sqlx::query("SELECT questionnaire_id, resource FROM questionnaire WHERE questionnaire_id = $1")
                .bind(questionnaire_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(Error::Database)?
        else {
            return Ok(None);
        };
        let header = QuestionnaireRow {
            questionnaire_id: row.try_get("questionnaire_id")?,
            resource: row.try_get("resource")?,
        };

        let groups = sqlx::query(
            "SELECT group_id, questionnaire_id, parent_id, ordinal, data
             FROM questionnaire_group WHERE questionnaire_id = $1",
        )
        .bind(questionnaire_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|row| {
            Ok(QuestionnaireGroupRow {
                group_id: row.try_get("group_id")?,
                questionnaire_id: row.try_get("questionnaire_id")?,
                parent_id: row.try_get("parent_id")?,
                ordinal: row.try_get("ordinal")?,
                data: row.try_get("data")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let questions = sqlx::query(
            "SELECT question_id, questionnaire_id, parent_id, ordinal, data
             FROM question WHERE questionnaire_id = $1",
        )
        .bind(questionnaire_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|row| {
            Ok(QuestionRow {
                question_id: row.try_get("question_id")?,
                questionnaire_id: row.try_get("questionnaire_id")?,
                parent_id: row.try_get("parent_id")?,
                ordinal: row.try_get("ordinal")?,
                data: row.try_get("data")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Some((header, groups, questions)))
    }
}
