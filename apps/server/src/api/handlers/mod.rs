//! Request handlers for API endpoints
//!
//! Handlers coordinate between routes and services, handling:
//! - Request extraction and validation
//! - Service invocation
//! - Response formatting

pub mod awardees;
pub mod metrics;
pub mod participants;
pub mod physical_measurements;
pub mod questionnaires;

pub use awardees::*;
pub use metrics::*;
pub use participants::*;
pub use physical_measurements::*;
pub use questionnaires::*;
