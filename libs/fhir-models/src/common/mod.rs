//! FHIR models shared by the physical measurements and questionnaire flows

pub mod bundle;
pub mod composition;
pub mod datatypes;
pub mod datetime;
pub mod error;
pub mod observation;
pub mod questionnaire;

// Re-export commonly used types
pub use bundle::*;
pub use composition::*;
pub use datatypes::*;
pub use datetime::*;
pub use error::{Error, Result};
pub use observation::*;
pub use questionnaire::*;
