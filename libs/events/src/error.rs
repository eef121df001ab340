//! Error types for building audit and notification records.

use thiserror::Error;

/// Errors that can occur when building or encoding records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required builder field was never set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
