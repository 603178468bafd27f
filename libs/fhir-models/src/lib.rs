//! FHIR document models for the research data repository
//!
//! Strongly-typed views over the handful of FHIR shapes the repository accepts from
//! clients: physical measurement documents (a `Bundle` holding one `Composition` and
//! many `Observation`s) and DSTU2 `Questionnaire` definitions.
//!
//! The types are deliberately lenient: every element is optional unless the server
//! cannot do anything without it, and unknown properties are kept in a flattened
//! `extensions` map so documents round-trip untouched.
//!
//! # Example
//!
//! ```rust
//! use rdr_fhir_models::common::{Bundle, Observation};
//! use serde_json::json;
//!
//! let bundle = Bundle::from_value(&json!({
//!     "resourceType": "Bundle",
//!     "type": "document",
//!     "entry": [{
//!         "fullUrl": "urn:example:height",
//!         "resource": {
//!             "resourceType": "Observation",
//!             "effectiveDateTime": "2016-12-12T15:59:00-05:00",
//!             "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
//!             "valueQuantity": {"value": 160.2, "code": "cm"}
//!         }
//!     }]
//! }))
//! .unwrap();
//!
//! let observation = Observation::from_value(bundle.entries()[0].resource.as_ref().unwrap()).unwrap();
//! assert_eq!(observation.value_quantity.unwrap().code.as_deref(), Some("cm"));
//! ```

pub mod common;

pub use common::*;
