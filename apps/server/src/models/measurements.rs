//! Physical measurements records and their measurement trees

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::enums::PhysicalMeasurementsStatus;

/// A code in a code system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Concept {
    pub system: String,
    pub code: String,
}

impl Concept {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// `physical_measurements_id * 1000 + position`; 0 until assigned
    pub measurement_id: i64,
    pub physical_measurements_id: i64,
    pub code_system: String,
    pub code_value: String,
    /// Wall-clock time as written in the document, offset dropped
    pub measurement_time: NaiveDateTime,
    pub body_site_code_system: Option<String>,
    pub body_site_code_value: Option<String>,
    pub value_string: Option<String>,
    pub value_decimal: Option<Decimal>,
    pub value_unit: Option<String>,
    pub value_code_system: Option<String>,
    pub value_code_value: Option<String>,
    pub value_date_time: Option<NaiveDateTime>,
    /// Components of this measurement; they have no children of their own
    pub measurements: Vec<Measurement>,
    /// Positions in the owning record's top-level `measurements` of the qualifying measurements
    pub qualifiers: Vec<usize>,
}

impl Measurement {
    pub fn new(code: Concept, measurement_time: NaiveDateTime) -> Self {
        Self {
            measurement_id: 0,
            physical_measurements_id: 0,
            code_system: code.system,
            code_value: code.code,
            measurement_time,
            body_site_code_system: None,
            body_site_code_value: None,
            value_string: None,
            value_decimal: None,
            value_unit: None,
            value_code_system: None,
            value_code_value: None,
            value_date_time: None,
            measurements: Vec::new(),
            qualifiers: Vec::new(),
        }
    }

    pub fn code(&self) -> Concept {
        Concept::new(&self.code_system, &self.code_value)
    }

    pub fn body_site(&self) -> Option<Concept> {
        match (&self.body_site_code_system, &self.body_site_code_value) {
            (Some(system), Some(code)) => Some(Concept::new(system, code)),
            _ => None,
        }
    }

    pub fn value_code(&self) -> Option<Concept> {
        match (&self.value_code_system, &self.value_code_value) {
            (Some(system), Some(code)) => Some(Concept::new(system, code)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhysicalMeasurements {
    /// Random nine-digit id; 0 until assigned
    pub physical_measurements_id: i64,
    pub participant_id: i64,
    pub created: DateTime<Utc>,
    /// The submitted Bundle, with `id` set once stored
    pub resource: JsonValue,
    pub is_final: bool,
    pub amended_measurements_id: Option<i64>,
    pub log_position_id: i64,
    pub finalized: Option<DateTime<Utc>>,
    pub created_site_id: Option<i64>,
    pub created_username: Option<String>,
    pub finalized_site_id: Option<i64>,
    pub finalized_username: Option<String>,
    pub status: Option<PhysicalMeasurementsStatus>,
    pub reason: Option<String>,
    pub cancelled_username: Option<String>,
    pub cancelled_site_id: Option<i64>,
    pub cancelled_time: Option<DateTime<Utc>>,
    pub measurements: Vec<Measurement>,
}

impl PhysicalMeasurements {
    pub fn is_cancelled(&self) -> bool {
        self.status == Some(PhysicalMeasurementsStatus::Cancelled)
    }

    /// The stored resource minus its server-assigned `id`
    pub fn resource_without_id(&self) -> JsonValue {
        let mut resource = self.resource.clone();
        if let Some(map) = resource.as_object_mut() {
            map.remove("id");
        }
        resource
    }

    /// Same root record apart from id, creation time and log position
    pub fn equivalent_to(&self, other: &PhysicalMeasurements) -> bool {
        self.participant_id == other.participant_id
            && self.is_final == other.is_final
            && self.amended_measurements_id == other.amended_measurements_id
            && self.finalized == other.finalized
            && self.created_site_id == other.created_site_id
            && self.created_username == other.created_username
            && self.finalized_site_id == other.finalized_site_id
            && self.finalized_username == other.finalized_username
            && self.status == other.status
            && self.reason == other.reason
            && self.cancelled_username == other.cancelled_username
            && self.cancelled_site_id == other.cancelled_site_id
            && self.cancelled_time == other.cancelled_time
            && self.resource_without_id() == other.resource_without_id()
    }

    /// Measurement ids of the top-level measurements that qualify `measurement`
    pub fn qualifier_ids(&self, measurement: &Measurement) -> Vec<i64> {
        measurement
            .qualifiers
            .iter()
            .filter_map(|&index| self.measurements.get(index))
            .map(|q| q.measurement_id)
            .collect()
    }

    /// Top-level measurements plus their components
    pub fn measurement_count(&self) -> usize {
        self.measurements
            .iter()
            .map(|m| 1 + m.measurements.len())
            .sum()
    }

    pub fn to_client_json(&self) -> JsonValue {
        self.resource.clone()
    }
}
