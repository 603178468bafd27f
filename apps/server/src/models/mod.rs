//! Domain models for the RDR server

pub mod enums;
pub mod measurements;
pub mod organization;
pub mod participant;
pub mod questionnaire;

pub use enums::*;
pub use measurements::{Concept, Measurement, PhysicalMeasurements};
pub use organization::{Hpo, Organization, Site};
pub use participant::{
    format_biobank_id, format_participant_id, parse_participant_id, Participant, ParticipantInput,
    ParticipantSummary, SummaryUpdate,
};
pub use questionnaire::{QuestionRow, QuestionnaireGroupRow, QuestionnaireRow};
