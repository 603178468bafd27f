use super::builders::DocumentBuilder;
use serde_json::{json, Value};

/// Common test constants
pub mod constants {
    pub const LOINC_SYSTEM: &str = "http://loinc.org";
    pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
    pub const PMI_SYSTEM: &str = "http://terminology.pmi-ops.org/CodeSystem/physical-measurements";
    pub const AMENDMENT_URL: &str = "http://terminology.pmi-ops.org/StructureDefinition/amends";
    pub const CREATED_LOCATION_URL: &str =
        "http://terminology.pmi-ops.org/StructureDefinition/authored-location";
    pub const FINALIZED_LOCATION_URL: &str =
        "http://terminology.pmi-ops.org/StructureDefinition/finalized-location";
    pub const AUTHORING_STEP_URL: &str =
        "http://terminology.pmi-ops.org/StructureDefinition/authoring-step";
}

pub const CREATED_SITE: &str = "hpo-site-monroeville";
pub const FINALIZED_SITE: &str = "hpo-site-bannerphoenix";
pub const CREATOR: &str = "creator@pmi-ops.org";
pub const FINALIZER: &str = "finalizer@pmi-ops.org";

/// Height and weight taken and finalized at the two seeded sites
pub fn intake_document() -> Value {
    DocumentBuilder::new()
        .created_at(CREATED_SITE)
        .finalized_at(FINALIZED_SITE)
        .created_by(CREATOR)
        .finalized_by(FINALIZER)
        .quantity("urn:example:height", "8302-2", 167.3, "cm")
        .quantity("urn:example:weight", "29463-7", 68.1, "kg")
        .build()
}

/// Blood pressure with systolic/diastolic components, qualified by an irregular rhythm
pub fn blood_pressure_document() -> Value {
    DocumentBuilder::new()
        .created_at(CREATED_SITE)
        .finalized_at(FINALIZED_SITE)
        .observation(json!({
            "fullUrl": "urn:example:blood-pressure",
            "resource": {
                "resourceType": "Observation",
                "effectiveDateTime": "2018-03-01T06:35:00-05:00",
                "code": {"coding": [{"system": constants::LOINC_SYSTEM, "code": "55284-4"}]},
                "bodySite": {"coding": [{"system": constants::SNOMED_SYSTEM, "code": "368209003"}]},
                "component": [
                    {
                        "code": {"coding": [{"system": constants::LOINC_SYSTEM, "code": "8480-6"}]},
                        "valueQuantity": {"value": 109, "unit": "mmHg", "code": "mm[Hg]"}
                    },
                    {
                        "code": {"coding": [{"system": constants::LOINC_SYSTEM, "code": "8462-4"}]},
                        "valueQuantity": {"value": 44, "unit": "mmHg", "code": "mm[Hg]"}
                    }
                ],
                "related": [{"type": "qualified-by", "target": {"reference": "urn:example:irregular"}}]
            }
        }))
        .observation(json!({
            "fullUrl": "urn:example:irregular",
            "resource": {
                "resourceType": "Observation",
                "effectiveDateTime": "2018-03-01T06:35:00-05:00",
                "code": {"coding": [{"system": constants::PMI_SYSTEM, "code": "heart-rhythm-status"}]},
                "valueCodeableConcept": {"coding": [{"system": constants::SNOMED_SYSTEM, "code": "361137007"}]}
            }
        }))
        .build()
}

/// DSTU2 questionnaire with nested groups and a question carrying a follow-up group
pub fn consent_questionnaire() -> Value {
    json!({
        "resourceType": "Questionnaire",
        "status": "published",
        "publisher": "PMI",
        "identifier": [{"value": "consent-pii"}],
        "group": {
            "linkId": "root",
            "title": "Consent PII",
            "group": [
                {
                    "linkId": "name",
                    "question": [
                        {"linkId": "first", "text": "First name", "type": "string"},
                        {"linkId": "last", "text": "Last name", "type": "string"}
                    ]
                },
                {
                    "linkId": "contact",
                    "question": [{
                        "linkId": "prefers-email",
                        "type": "boolean",
                        "group": [{
                            "linkId": "email-group",
                            "question": [{"linkId": "email", "type": "string"}]
                        }]
                    }]
                }
            ]
        }
    })
}
