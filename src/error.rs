//! Error types for shortening, persistence and geolocation

use thiserror::Error;

use crate::model::ValidationError;

/// Why a creation batch was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortenError {
    /// One or more form entries are malformed; every problem is listed
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// A requested custom short code is already taken
    #[error("Shortcode \"{0}\" is already in use")]
    Collision(String),
}

impl ShortenError {
    /// Flattens the error into field-level messages for a form
    pub fn into_errors(self) -> Vec<ValidationError> {
        match self {
            ShortenError::Validation(errors) => errors,
            collision @ ShortenError::Collision(_) => {
                vec![ValidationError::new("customShortCode", collision.to_string())]
            }
        }
    }
}

/// Failure reading or writing the persisted collection
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure resolving a coarse visitor location
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location lookup disabled")]
    Disabled,

    #[error("location request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("location service answered {0}")]
    Status(reqwest::StatusCode),

    #[error("location lookup timed out")]
    Timeout,
}
