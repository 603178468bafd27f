//! Catalogue of the distinct measurements in use
//!
//! Used to generate realistic fake measurements: for each code, which body sites, value
//! types, units, value codes, qualifiers and components have been seen, plus the decimal
//! range.

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

use super::parser::NOTES_LIMIT;
use crate::{
    models::{Concept, Measurement},
    Error, Result,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementData {
    pub body_sites: BTreeSet<Concept>,
    pub types: BTreeSet<&'static str>,
    pub units: BTreeSet<String>,
    pub value_codes: BTreeSet<Concept>,
    pub submeasurements: BTreeSet<Concept>,
    pub qualifiers: BTreeSet<Concept>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

pub type MeasurementMap = BTreeMap<Concept, MeasurementData>;

/// Fold one measurement (and its components) into `map`.
///
/// `siblings` is the top-level measurement list qualifier positions point into.
pub fn handle_measurement(
    map: &mut MeasurementMap,
    measurement: &Measurement,
    siblings: &[Measurement],
) -> Result<()> {
    let data = map.entry(measurement.code()).or_default();

    if let Some(site) = measurement.body_site() {
        data.body_sites.insert(site);
    }
    if let Some(value) = &measurement.value_string {
        if value.chars().count() > NOTES_LIMIT {
            return Err(Error::BadRequest("Notes field exceeds limit.".to_string()));
        }
        data.types.insert("string");
    }
    if let Some(value) = measurement.value_decimal {
        data.types.insert("decimal");
        if data.min.map_or(true, |min| value < min) {
            data.min = Some(value);
        }
        if data.max.map_or(true, |max| value > max) {
            data.max = Some(value);
        }
    }
    if let Some(unit) = &measurement.value_unit {
        data.units.insert(unit.clone());
    }
    if let Some(code) = measurement.value_code() {
        data.value_codes.insert(code);
    }
    if measurement.value_date_time.is_some() {
        data.types.insert("date");
    }
    for qualifier in measurement.qualifiers.iter().filter_map(|&i| siblings.get(i)) {
        data.qualifiers.insert(qualifier.code());
    }
    for child in &measurement.measurements {
        data.submeasurements.insert(child.code());
    }

    for child in &measurement.measurements {
        handle_measurement(map, child, &[])?;
    }
    Ok(())
}

fn concept_json(concept: &Concept) -> JsonValue {
    json!({"system": concept.system, "code": concept.code})
}

fn decimal_json(value: Decimal) -> JsonValue {
    value
        .to_f64()
        .map(|v| json!(v))
        .unwrap_or_else(|| json!(value.to_string()))
}

/// `ancestors` holds the concepts already on the path from the top-level entry; a
/// submeasurement that repeats one of them is left out.
fn measurement_json<'a>(
    concept: &'a Concept,
    data: &'a MeasurementData,
    map: &'a MeasurementMap,
    ancestors: &mut BTreeSet<&'a Concept>,
) -> JsonValue {
    ancestors.insert(concept);
    let mut result = json!({
        "code": concept_json(concept),
        "bodySites": data.body_sites.iter().map(concept_json).collect::<Vec<_>>(),
        "types": data.types.iter().collect::<Vec<_>>(),
        "units": data.units.iter().collect::<Vec<_>>(),
    });
    if let Some(object) = result.as_object_mut() {
        if let Some(min) = data.min {
            object.insert("min".to_string(), decimal_json(min));
        }
        if let Some(max) = data.max {
            object.insert("max".to_string(), decimal_json(max));
        }
        object.insert(
            "valueCodes".to_string(),
            json!(data.value_codes.iter().map(concept_json).collect::<Vec<_>>()),
        );
        object.insert(
            "qualifiers".to_string(),
            json!(data.qualifiers.iter().map(concept_json).collect::<Vec<_>>()),
        );
        let mut submeasurements = Vec::new();
        for sub in &data.submeasurements {
            if ancestors.contains(sub) {
                tracing::warn!(
                    system = %sub.system,
                    code = %sub.code,
                    "Measurement is nested inside itself; skipping the repeated component"
                );
                continue;
            }
            if let Some(sub_data) = map.get(sub) {
                submeasurements.push(measurement_json(sub, sub_data, map, ancestors));
            }
        }
        object.insert("submeasurements".to_string(), json!(submeasurements));
    }
    ancestors.remove(concept);
    result
}

/// Top-level entries only; components appear nested under their parents
pub fn distinct_measurements_json(map: &MeasurementMap) -> Vec<JsonValue> {
    let components: BTreeSet<&Concept> = map
        .values()
        .flat_map(|data| data.submeasurements.iter())
        .collect();
    map.iter()
        .filter(|(concept, _)| !components.contains(concept))
        .map(|(concept, data)| measurement_json(concept, data, map, &mut BTreeSet::new()))
        .collect()
}
