//! HTTP API tests against the in-memory store

#[path = "../support/mod.rs"]
mod support;

mod awardees;
mod participants;
mod physical_measurements;
mod questionnaires;
mod sync;
