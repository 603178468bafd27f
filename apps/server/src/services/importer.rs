//! Awardee, organization and site import from CSV exports
//!
//! Each file is imported in one transaction. Rows are keyed on their external identity
//! (awardee name, organization id, site google group); new rows are inserted, changed rows
//! updated and identical rows left alone, so running an import twice is a no-op. A dry run
//! reports the same counts and rolls back.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::{
    db::{Store, StoreTransaction},
    models::{Hpo, Organization, OrganizationType, Site, SiteStatus},
    Error, Result,
};

pub const HPO_AWARDEE_ID_COLUMN: &str = "Awardee ID";
pub const HPO_NAME_COLUMN: &str = "Name";
pub const HPO_TYPE_COLUMN: &str = "Type";

pub const ORGANIZATION_AWARDEE_ID_COLUMN: &str = "Awardee ID";
pub const ORGANIZATION_ORGANIZATION_ID_COLUMN: &str = "Organization ID";
pub const ORGANIZATION_NAME_COLUMN: &str = "Name";

pub const SITE_ORGANIZATION_ID_COLUMN: &str = "Organization ID";
pub const SITE_SITE_ID_COLUMN: &str = "Site ID / Google Group";
pub const SITE_SITE_COLUMN: &str = "Site";
pub const SITE_MAYOLINK_CLIENT_NUMBER_COLUMN: &str = "MayoLINK Client #";
pub const SITE_NOTES_COLUMN: &str = "Notes";
pub const SITE_STATUS_COLUMN: &str = "Status";
pub const SITE_LAUNCH_DATE_COLUMN: &str = "Anticipated Launch Date";
pub const SITE_DIRECTIONS_COLUMN: &str = "Directions";
pub const SITE_PHYSICAL_LOCATION_NAME_COLUMN: &str = "Physical Location Name";
pub const SITE_ADDRESS_1_COLUMN: &str = "Address 1";
pub const SITE_ADDRESS_2_COLUMN: &str = "Address 2";
pub const SITE_CITY_COLUMN: &str = "City";
pub const SITE_STATE_COLUMN: &str = "State";
pub const SITE_ZIP_COLUMN: &str = "Zip";
pub const SITE_PHONE_COLUMN: &str = "Phone";
pub const SITE_ADMIN_EMAIL_ADDRESSES_COLUMN: &str = "Admin Email Addresses";
pub const SITE_LINK_COLUMN: &str = "Link";

const LAUNCH_DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

/// Counts reported for one imported file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Rows that could not be mapped to an entity
    pub skipped: usize,
}

/// One CSV row keyed by header, values trimmed
#[derive(Debug, Clone, Default)]
pub struct CsvRow(HashMap<String, String>);

impl CsvRow {
    fn get(&self, column: &str) -> &str {
        self.0.get(column).map(String::as_str).unwrap_or("")
    }

    /// `None` for a missing column or an empty cell
    fn optional(&self, column: &str) -> Option<String> {
        Some(self.get(column)).filter(|v| !v.is_empty()).map(str::to_string)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CsvRow {
    fn from(cells: [(&str, &str); N]) -> Self {
        CsvRow(
            cells
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Read every row, failing when a required column is missing from the header
pub fn read_rows(reader: impl Read, kind: &str, required: &[&str]) -> Result<Vec<CsvRow>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv
        .headers()
        .map_err(|e| Error::BadRequest(format!("Invalid {kind} CSV: {e}")))?
        .clone();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(Error::BadRequest(format!(
            "Missing columns {missing:?} in {kind} CSV"
        )));
    }

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record.map_err(|e| Error::BadRequest(format!("Invalid {kind} CSV: {e}")))?;
        rows.push(CsvRow(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        ));
    }
    Ok(rows)
}

pub fn hpo_from_row(row: &CsvRow) -> Option<Hpo> {
    let name = row.get(HPO_AWARDEE_ID_COLUMN);
    let type_str = row.get(HPO_TYPE_COLUMN);
    let organization_type = match type_str.parse::<OrganizationType>() {
        Ok(OrganizationType::Unset) => None,
        Ok(organization_type) => Some(organization_type),
        Err(_) => {
            tracing::warn!(awardee = name, organization_type = type_str, "Invalid organization type");
            return None;
        }
    };
    Some(Hpo {
        hpo_id: 0,
        name: name.to_string(),
        display_name: row.get(HPO_NAME_COLUMN).to_string(),
        organization_type,
    })
}

pub fn parse_launch_date(value: &str) -> Option<NaiveDate> {
    LAUNCH_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Map a site row; `organization` is the row's organization when it exists
pub fn site_from_row(row: &CsvRow, organization: Option<&Organization>) -> Option<Site> {
    let google_group = row.get(SITE_SITE_ID_COLUMN);
    let Some(organization) = organization else {
        tracing::warn!(
            organization = row.get(SITE_ORGANIZATION_ID_COLUMN),
            site = google_group,
            "Invalid organization ID importing site"
        );
        return None;
    };

    let launch_date = match row.optional(SITE_LAUNCH_DATE_COLUMN) {
        None => None,
        Some(value) => match parse_launch_date(&value) {
            Some(date) => Some(date),
            None => {
                tracing::warn!(launch_date = %value, site = google_group, "Invalid launch date");
                return None;
            }
        },
    };
    let mayolink = row.get(SITE_MAYOLINK_CLIENT_NUMBER_COLUMN);
    let Ok(mayolink_client_number) = mayolink.parse::<i64>() else {
        tracing::warn!(mayolink = mayolink, site = google_group, "Invalid Mayolink Client #");
        return None;
    };
    let status = row.get(SITE_STATUS_COLUMN);
    let Ok(site_status) = status.parse::<SiteStatus>() else {
        tracing::warn!(status = status, site = google_group, "Invalid site status");
        return None;
    };

    Some(Site {
        site_id: 0,
        site_name: row.get(SITE_SITE_COLUMN).to_string(),
        google_group: google_group.to_string(),
        mayolink_client_number: Some(mayolink_client_number),
        organization_id: Some(organization.organization_id),
        hpo_id: Some(organization.hpo_id),
        site_status: Some(site_status),
        launch_date,
        notes: row.optional(SITE_NOTES_COLUMN),
        directions: row.optional(SITE_DIRECTIONS_COLUMN),
        physical_location_name: row.optional(SITE_PHYSICAL_LOCATION_NAME_COLUMN),
        address_1: row.optional(SITE_ADDRESS_1_COLUMN),
        address_2: row.optional(SITE_ADDRESS_2_COLUMN),
        city: row.optional(SITE_CITY_COLUMN),
        state: row.optional(SITE_STATE_COLUMN),
        zip_code: row.optional(SITE_ZIP_COLUMN),
        phone_number: row.optional(SITE_PHONE_COLUMN),
        admin_emails: row.optional(SITE_ADMIN_EMAIL_ADDRESSES_COLUMN),
        link: row.optional(SITE_LINK_COLUMN),
        latitude: None,
        longitude: None,
    })
}

enum Change {
    Insert,
    Update,
    Unchanged,
}

/// Compare a mapped entity against the stored one carrying the same key
fn classify<T: PartialEq>(entity: &T, existing: Option<&T>) -> Change {
    match existing {
        None => Change::Insert,
        Some(existing) if existing == entity => Change::Unchanged,
        Some(_) => Change::Update,
    }
}

async fn finish(tx: Box<dyn StoreTransaction>, kind: &str, summary: ImportSummary, dry_run: bool) -> Result<ImportSummary> {
    if dry_run {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }
    tracing::info!(
        kind,
        dry_run,
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        skipped = summary.skipped,
        "Import finished"
    );
    Ok(summary)
}

pub struct ReferenceDataImporter {
    store: Arc<dyn Store>,
}

impl ReferenceDataImporter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Awardee ids are assigned here: the stored count plus the number inserted so far
    pub async fn import_awardees(&self, reader: impl Read, dry_run: bool) -> Result<ImportSummary> {
        let rows = read_rows(
            reader,
            "awardee",
            &[HPO_AWARDEE_ID_COLUMN, HPO_NAME_COLUMN, HPO_TYPE_COLUMN],
        )?;
        let mut tx = self.store.begin().await?;
        let existing: HashMap<String, Hpo> = tx
            .list_hpos()
            .await?
            .into_iter()
            .map(|hpo| (hpo.name.clone(), hpo))
            .collect();
        let mut summary = ImportSummary::default();

        for row in &rows {
            let Some(mut hpo) = hpo_from_row(row) else {
                summary.skipped += 1;
                continue;
            };
            let stored = existing.get(&hpo.name);
            if let Some(stored) = stored {
                hpo.hpo_id = stored.hpo_id;
            }
            match classify(&hpo, stored) {
                Change::Insert => {
                    hpo.hpo_id = (existing.len() + summary.inserted) as i64;
                    tracing::info!(name = %hpo.name, hpo_id = hpo.hpo_id, dry_run, "Inserting awardee");
                    if !dry_run {
                        tx.insert_hpo(&hpo).await?;
                    }
                    summary.inserted += 1;
                }
                Change::Update => {
                    tracing::info!(name = %hpo.name, dry_run, "Updating awardee");
                    if !dry_run {
                        tx.update_hpo(&hpo).await?;
                    }
                    summary.updated += 1;
                }
                Change::Unchanged => summary.unchanged += 1,
            }
        }
        finish(tx, "awardee", summary, dry_run).await
    }

    pub async fn import_organizations(&self, reader: impl Read, dry_run: bool) -> Result<ImportSummary> {
        let rows = read_rows(
            reader,
            "organization",
            &[
                ORGANIZATION_AWARDEE_ID_COLUMN,
                ORGANIZATION_ORGANIZATION_ID_COLUMN,
                ORGANIZATION_NAME_COLUMN,
            ],
        )?;
        let mut tx = self.store.begin().await?;
        let mut summary = ImportSummary::default();

        for row in &rows {
            let external_id = row.get(ORGANIZATION_ORGANIZATION_ID_COLUMN);
            let awardee = row.get(ORGANIZATION_AWARDEE_ID_COLUMN);
            let Some(hpo) = tx.get_hpo_by_name(awardee).await? else {
                tracing::warn!(awardee, organization = external_id, "Invalid awardee ID importing organization");
                summary.skipped += 1;
                continue;
            };
            let stored = tx.get_organization_by_external_id(external_id).await?;
            let organization = Organization {
                organization_id: stored.as_ref().map_or(0, |o| o.organization_id),
                external_id: external_id.to_string(),
                display_name: row.get(ORGANIZATION_NAME_COLUMN).to_string(),
                hpo_id: hpo.hpo_id,
            };
            match classify(&organization, stored.as_ref()) {
                Change::Insert => {
                    tracing::info!(organization = external_id, dry_run, "Inserting organization");
                    if !dry_run {
                        tx.insert_organization(&organization).await?;
                    }
                    summary.inserted += 1;
                }
                Change::Update => {
                    tracing::info!(organization = external_id, dry_run, "Updating organization");
                    if !dry_run {
                        tx.update_organization(&organization).await?;
                    }
                    summary.updated += 1;
                }
                Change::Unchanged => summary.unchanged += 1,
            }
        }
        finish(tx, "organization", summary, dry_run).await
    }

    pub async fn import_sites(&self, reader: impl Read, dry_run: bool) -> Result<ImportSummary> {
        let rows = read_rows(
            reader,
            "site",
            &[
                SITE_ORGANIZATION_ID_COLUMN,
                SITE_SITE_ID_COLUMN,
                SITE_SITE_COLUMN,
                SITE_MAYOLINK_CLIENT_NUMBER_COLUMN,
                SITE_STATUS_COLUMN,
            ],
        )?;
        let mut tx = self.store.begin().await?;
        let mut summary = ImportSummary::default();

        for row in &rows {
            let organization = tx
                .get_organization_by_external_id(row.get(SITE_ORGANIZATION_ID_COLUMN))
                .await?;
            let Some(mut site) = site_from_row(row, organization.as_ref()) else {
                summary.skipped += 1;
                continue;
            };
            let stored = tx.get_site_by_google_group(&site.google_group).await?;
            if let Some(stored) = &stored {
                site.site_id = stored.site_id;
                site.latitude = stored.latitude;
                site.longitude = stored.longitude;
            }
            match classify(&site, stored.as_ref()) {
                Change::Insert => {
                    tracing::info!(site = %site.google_group, dry_run, "Inserting site");
                    if !dry_run {
                        tx.insert_site(&site).await?;
                    }
                    summary.inserted += 1;
                }
                Change::Update => {
                    tracing::info!(site = %site.google_group, dry_run, "Updating site");
                    if !dry_run {
                        tx.update_site(&site).await?;
                    }
                    summary.updated += 1;
                }
                Change::Unchanged => summary.unchanged += 1,
            }
        }
        finish(tx, "site", summary, dry_run).await
    }
}
