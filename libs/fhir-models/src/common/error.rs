//! Error types for FHIR models

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid FHIR resource: {0}")]
    InvalidResource(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid dateTime value: {0}")]
    InvalidDateTime(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
