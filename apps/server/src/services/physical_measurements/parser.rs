//! Physical measurements document parsing
//!
//! Turns a submitted `Bundle` into the measurement tree stored next to the raw document.
//! Site references are returned as written; the caller resolves them against the site
//! table.
//!
//! Observations are read in two passes. The first pass takes observations with no
//! `related` element and registers each under its `fullUrl` as a possible qualifier. The
//! second pass takes observations that do have `related`, linking `qualified-by` targets
//! to the measurements registered in the first pass.

use rdr_fhir_models::{
    Bundle, CodeableConcept, Coding, Composition, FhirDateTime, Observation,
    ObservationComponent,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::{
    models::{Concept, Measurement},
    Error, Result,
};

pub const AMENDMENT_URL: &str = "http://terminology.pmi-ops.org/StructureDefinition/amends";
pub const CREATED_LOCATION_URL: &str =
    "http://terminology.pmi-ops.org/StructureDefinition/authored-location";
pub const FINALIZED_LOCATION_URL: &str =
    "http://terminology.pmi-ops.org/StructureDefinition/finalized-location";
pub const AUTHORING_STEP_URL: &str =
    "http://terminology.pmi-ops.org/StructureDefinition/authoring-step";
pub const PM_SYSTEM_PREFIX: &str = "http://terminology.pmi-ops.org/CodeSystem/";

pub const KNOWN_EXTENSIONS: [&str; 3] = [AMENDMENT_URL, CREATED_LOCATION_URL, FINALIZED_LOCATION_URL];

pub const LOCATION_PREFIX: &str = "Location/";
pub const AUTHOR_PREFIX: &str = "Practitioner/";

const CREATED_STEP: &str = "created";
const FINALIZED_STEP: &str = "finalized";
const QUALIFIED_BY: &str = "qualified-by";

/// Longest accepted free-text value, in characters
pub const NOTES_LIMIT: usize = 65535;

/// Everything derived from one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub measurements: Vec<Measurement>,
    /// `Location/<google group>` as written in the `authored-location` extension
    pub created_location: Option<String>,
    pub finalized_location: Option<String>,
    pub created_username: Option<String>,
    pub finalized_username: Option<String>,
}

pub fn is_known_extension(url: Option<&str>) -> bool {
    url.is_some_and(|url| KNOWN_EXTENSIONS.contains(&url))
}

/// The first coding, unless a later one uses the PMI code system.
///
/// Two PMI codings in one concept are rejected.
pub fn preferred_coding(concept: &CodeableConcept) -> Result<Option<&Coding>> {
    let mut preferred: Option<&Coding> = None;
    for coding in &concept.coding {
        match preferred {
            None => preferred = Some(coding),
            Some(current) if coding.system_starts_with(PM_SYSTEM_PREFIX) => {
                if current.system_starts_with(PM_SYSTEM_PREFIX) {
                    return Err(Error::BadRequest(format!(
                        "Multiple measurement codes starting system {PM_SYSTEM_PREFIX}"
                    )));
                }
                preferred = Some(coding);
            }
            Some(_) => {}
        }
    }
    Ok(preferred)
}

fn coding_concept(concept: &CodeableConcept) -> Result<Option<Concept>> {
    let Some(coding) = preferred_coding(concept)? else {
        return Ok(None);
    };
    match (&coding.system, &coding.code) {
        (Some(system), Some(code)) => Ok(Some(Concept::new(system, code))),
        _ => Err(Error::BadRequest(
            "Measurement coding requires both system and code".to_string(),
        )),
    }
}

/// Strips `Practitioner/`; anything else is logged and dropped
pub fn author_username(reference: &str) -> Option<String> {
    match reference.strip_prefix(AUTHOR_PREFIX) {
        Some(username) => Some(username.to_string()),
        None => {
            tracing::warn!(author = reference, "Invalid author");
            None
        }
    }
}

/// Strips `Location/`; anything else is logged and dropped
pub fn location_google_group(location: &str) -> Option<&str> {
    let group = location.strip_prefix(LOCATION_PREFIX);
    if group.is_none() {
        tracing::warn!(location, "Invalid location");
    }
    group
}

fn wall_clock(value: &str) -> Result<chrono::NaiveDateTime> {
    Ok(FhirDateTime::parse(value)?.wall_clock())
}

fn check_notes(value: &str, message: &str) -> Result<()> {
    if value.chars().count() > NOTES_LIMIT {
        return Err(Error::BadRequest(message.to_string()));
    }
    Ok(())
}

fn set_value_code(measurement: &mut Measurement, concept: Option<&CodeableConcept>) -> Result<()> {
    if let Some(concept) = concept.filter(|c| c.has_coding()) {
        if let Some(value) = coding_concept(concept)? {
            measurement.value_code_system = Some(value.system);
            measurement.value_code_value = Some(value.code);
        }
    }
    Ok(())
}

fn from_component(
    component: &ObservationComponent,
    measurement_time: chrono::NaiveDateTime,
) -> Result<Option<Measurement>> {
    let Some(code) = component.coded_code() else {
        tracing::warn!("Skipping component without coding");
        return Ok(None);
    };
    let Some(code) = coding_concept(code)? else {
        return Ok(None);
    };

    let mut child = Measurement::new(code, measurement_time);
    if let Some(quantity) = &component.value_quantity {
        child.value_decimal = quantity.value;
        child.value_unit = quantity.code.clone();
    }
    if let Some(value) = &component.value_date_time {
        child.value_date_time = Some(wall_clock(value)?);
    }
    if let Some(value) = &component.value_string {
        check_notes(value, "Component notes field exceeds limit.")?;
        child.value_string = Some(value.clone());
    }
    set_value_code(&mut child, component.value_codeable_concept.as_ref())?;
    Ok(Some(child))
}

fn from_observation(
    observation: &Observation,
    qualifiers: &HashMap<&str, usize>,
) -> Result<Option<Measurement>> {
    let Some(effective) = observation.effective_date_time.as_deref() else {
        tracing::warn!(id = ?observation.id, "Skipping observation without effectiveDateTime");
        return Ok(None);
    };
    let Some(code) = observation.coded_code() else {
        tracing::warn!(id = ?observation.id, "Skipping observation without coding");
        return Ok(None);
    };
    let Some(code) = coding_concept(code)? else {
        return Ok(None);
    };

    let measurement_time = wall_clock(effective)?;
    let mut measurement = Measurement::new(code, measurement_time);

    if let Some(body_site) = observation.body_site.as_ref().filter(|c| c.has_coding()) {
        if let Some(site) = coding_concept(body_site)? {
            measurement.body_site_code_system = Some(site.system);
            measurement.body_site_code_value = Some(site.code);
        }
    }
    if let Some(quantity) = &observation.value_quantity {
        measurement.value_decimal = quantity.value;
        measurement.value_unit = quantity.code.clone();
    }
    if let Some(value) = &observation.value_date_time {
        measurement.value_date_time = Some(wall_clock(value)?);
    }
    if let Some(value) = &observation.value_string {
        check_notes(value, "Observation notes field exceeds limit.")?;
        measurement.value_string = Some(value.clone());
    }
    set_value_code(&mut measurement, observation.value_codeable_concept.as_ref())?;

    for component in &observation.component {
        if let Some(child) = from_component(component, measurement_time)? {
            measurement.measurements.push(child);
        }
    }

    for related in &observation.related {
        if related.relation_type.as_deref() != Some(QUALIFIED_BY) {
            continue;
        }
        let Some(target) = related.target_reference() else {
            continue;
        };
        match qualifiers.get(target) {
            Some(&index) => measurement.qualifiers.push(index),
            None => tracing::warn!(target, "Could not find qualifier"),
        }
    }

    Ok(Some(measurement))
}

fn read_composition(resource: &JsonValue, parsed: &mut ParsedDocument) -> Result<()> {
    let composition = Composition::from_value(resource)?;

    if composition.extension.is_empty() {
        tracing::warn!("No extensions in composition resource (expected site info)");
    }
    for extension in &composition.extension {
        let Some(reference) = extension.value_reference.as_ref().and_then(|r| r.reference())
        else {
            tracing::warn!(url = ?extension.url, "No valueReference in extension, skipping");
            continue;
        };
        match extension.url.as_deref() {
            Some(CREATED_LOCATION_URL) => parsed.created_location = Some(reference.to_string()),
            Some(FINALIZED_LOCATION_URL) => {
                parsed.finalized_location = Some(reference.to_string())
            }
            url if !is_known_extension(url) => {
                tracing::warn!(url = ?url, "Unrecognized extension URL");
            }
            _ => {}
        }
    }

    for author in &composition.author {
        let Some(reference) = author.reference.as_deref() else {
            continue;
        };
        match author.extension_code(AUTHORING_STEP_URL) {
            Some(FINALIZED_STEP) => parsed.finalized_username = author_username(reference),
            Some(CREATED_STEP) => parsed.created_username = author_username(reference),
            _ => {}
        }
    }
    Ok(())
}

/// Parse a physical measurements document into its measurement tree and audit fields
pub fn parse_document(resource: &JsonValue) -> Result<ParsedDocument> {
    let bundle = Bundle::from_value(resource)?;
    let mut parsed = ParsedDocument::default();
    let mut observations: Vec<(&str, Observation)> = Vec::new();

    for entry in bundle.entries() {
        let Some(resource) = entry.resource.as_ref() else {
            continue;
        };
        match entry.resource_type() {
            Some("Observation") => {
                let full_url = entry.full_url.as_deref().ok_or_else(|| {
                    Error::BadRequest("Observation entry is missing fullUrl".to_string())
                })?;
                observations.push((full_url, Observation::from_value(resource)?));
            }
            Some("Composition") => read_composition(resource, &mut parsed)?,
            other => {
                tracing::warn!(resource_type = ?other, "Unrecognized resource type, skipping");
            }
        }
    }

    let mut qualifiers: HashMap<&str, usize> = HashMap::new();
    for (full_url, observation) in observations.iter().filter(|(_, o)| o.related.is_empty()) {
        if let Some(measurement) = from_observation(observation, &qualifiers)? {
            qualifiers.insert(*full_url, parsed.measurements.len());
            parsed.measurements.push(measurement);
        }
    }
    for (_, observation) in observations.iter().filter(|(_, o)| !o.related.is_empty()) {
        if let Some(measurement) = from_observation(observation, &qualifiers)? {
            parsed.measurements.push(measurement);
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn composition() -> JsonValue {
        json!({
            "fullUrl": "urn:example:report",
            "resource": {
                "resourceType": "Composition",
                "date": "2018-03-08T19:03:56Z",
                "extension": [
                    {"url": CREATED_LOCATION_URL, "valueReference": "Location/hpo-site-monroeville"},
                    {"url": FINALIZED_LOCATION_URL, "valueReference": "Location/hpo-site-bannerphoenix"},
                    {"url": "http://example.org/unknown", "valueReference": "Location/x"}
                ],
                "author": [
                    {
                        "reference": "Practitioner/creator@pmi-ops.org",
                        "extension": {"url": AUTHORING_STEP_URL, "valueCode": "created"}
                    },
                    {
                        "reference": "Practitioner/finalizer@pmi-ops.org",
                        "extension": {"url": AUTHORING_STEP_URL, "valueCode": "finalized"}
                    }
                ]
            }
        })
    }

    fn observation(full_url: &str, code: &str, extra: JsonValue) -> JsonValue {
        let mut resource = json!({
            "resourceType": "Observation",
            "effectiveDateTime": "2016-01-04T09:40:21-05:00",
            "code": {"coding": [
                {"system": "http://loinc.org", "code": code},
                {"system": "http://terminology.pmi-ops.org/CodeSystem/physical-measurements", "code": format!("pmi-{code}")}
            ]}
        });
        if let (Some(target), Some(extra)) = (resource.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        json!({"fullUrl": full_url, "resource": resource})
    }

    fn document(entries: Vec<JsonValue>) -> JsonValue {
        json!({"resourceType": "Bundle", "type": "document", "entry": entries})
    }

    #[test]
    fn reads_sites_authors_and_measurements() {
        let doc = document(vec![
            composition(),
            observation("urn:example:weight", "29463-7", json!({"valueQuantity": {"value": 68.3, "code": "kg"}})),
        ]);
        let parsed = parse_document(&doc).unwrap();

        assert_eq!(parsed.created_location.as_deref(), Some("Location/hpo-site-monroeville"));
        assert_eq!(parsed.finalized_location.as_deref(), Some("Location/hpo-site-bannerphoenix"));
        assert_eq!(parsed.created_username.as_deref(), Some("creator@pmi-ops.org"));
        assert_eq!(parsed.finalized_username.as_deref(), Some("finalizer@pmi-ops.org"));

        let weight = &parsed.measurements[0];
        assert_eq!(weight.code_value, "pmi-29463-7");
        assert_eq!(weight.value_decimal, Some(Decimal::from_str("68.3").unwrap()));
        assert_eq!(weight.value_unit.as_deref(), Some("kg"));
        assert_eq!(weight.measurement_time.to_string(), "2016-01-04 09:40:21");
    }

    #[test]
    fn qualified_observations_come_after_their_qualifiers() {
        let doc = document(vec![
            observation(
                "urn:example:bp",
                "55284-4",
                json!({
                    "related": [{"type": "qualified-by", "target": {"reference": "urn:example:irregular"}}],
                    "component": [
                        {"code": {"coding": [{"system": "http://loinc.org", "code": "8480-6"}]}, "valueQuantity": {"value": 109, "code": "mm[Hg]"}},
                        {"code": {"text": "no coding"}}
                    ]
                }),
            ),
            observation(
                "urn:example:irregular",
                "irregular",
                json!({"valueCodeableConcept": {"coding": [{"system": "http://snomed.info/sct", "code": "361137007"}]}}),
            ),
        ]);
        let parsed = parse_document(&doc).unwrap();

        assert_eq!(parsed.measurements.len(), 2);
        assert_eq!(parsed.measurements[0].code_value, "pmi-irregular");
        assert_eq!(parsed.measurements[0].value_code_value.as_deref(), Some("361137007"));
        let bp = &parsed.measurements[1];
        assert_eq!(bp.qualifiers, vec![0]);
        assert_eq!(bp.measurements.len(), 1);
        assert_eq!(bp.measurements[0].code_value, "8480-6");
        assert_eq!(bp.measurements[0].measurement_time, bp.measurement_time);
    }

    #[test]
    fn skips_observations_without_time_or_coding() {
        let doc = document(vec![
            json!({"fullUrl": "urn:a", "resource": {"resourceType": "Observation", "code": {"coding": [{"system": "s", "code": "c"}]}}}),
            json!({"fullUrl": "urn:b", "resource": {"resourceType": "Observation", "effectiveDateTime": "2016-01-04T09:40:21Z"}}),
            json!({"fullUrl": "urn:c"}),
        ]);
        assert!(parse_document(&doc).unwrap().measurements.is_empty());
    }

    #[test]
    fn rejects_two_pmi_codings() {
        let concept: CodeableConcept = serde_json::from_value(json!({"coding": [
            {"system": "http://loinc.org", "code": "a"},
            {"system": "http://terminology.pmi-ops.org/CodeSystem/x", "code": "b"},
            {"system": "http://terminology.pmi-ops.org/CodeSystem/y", "code": "c"}
        ]}))
        .unwrap();
        let err = preferred_coding(&concept).unwrap_err();
        assert!(err.to_string().starts_with("Multiple measurement codes starting system"));
    }

    #[test]
    fn rejects_oversized_notes() {
        let notes = "x".repeat(NOTES_LIMIT + 1);
        let doc = document(vec![observation("urn:notes", "notes", json!({"valueString": notes}))]);
        let err = parse_document(&doc).unwrap_err();
        assert_eq!(err.to_string(), "Observation notes field exceeds limit.");
    }

    #[test]
    fn observation_without_full_url_is_rejected() {
        let doc = document(vec![json!({"resource": {"resourceType": "Observation"}})]);
        assert!(matches!(parse_document(&doc), Err(Error::BadRequest(_))));
    }

    #[test]
    fn author_and_location_prefixes() {
        assert_eq!(author_username("Practitioner/a@b.org").as_deref(), Some("a@b.org"));
        assert_eq!(author_username("Person/a@b.org"), None);
        assert_eq!(location_google_group("Location/hpo-site-a"), Some("hpo-site-a"));
        assert_eq!(location_google_group("hpo-site-a"), None);
    }
}
