//! Research data repository server
//!
//! Stores participants, their enrollment summaries, physical measurements documents and
//! questionnaire definitions, and serves them over a JSON HTTP API.
//!
//! - Physical measurements: parse FHIR document bundles into measurement rows, amend,
//!   cancel and restore, and roll the latest state up onto the participant summary
//! - Sync feed over every participant's records in log order
//! - Reference data (awardees, organizations, sites) imported from CSV

#![allow(
    clippy::too_many_arguments,      // Functions with many args are acceptable for domain operations
    clippy::type_complexity,         // Complex types are acceptable when they represent domain concepts
)]

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
