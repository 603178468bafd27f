pub mod awardees;
pub mod importer;
pub mod participants;
pub mod physical_measurements;
pub mod questionnaires;

pub use awardees::AwardeeService;
pub use importer::{ImportSummary, ReferenceDataImporter};
pub use participants::ParticipantService;
pub use physical_measurements::PhysicalMeasurementsService;
pub use questionnaires::QuestionnaireService;

use rand::Rng;

/// Random 9-digit id for participants, biobank ids and physical measurements
pub(crate) fn random_id() -> i64 {
    rand::thread_rng().gen_range(100_000_000..1_000_000_000)
}
