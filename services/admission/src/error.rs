//! Admission error taxonomy.

use chrono::{DateTime, Utc};
use rsvp_id::{EventId, UserId};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Member-facing or request-shape validation failures. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("registration is disabled for this event")]
    RegistrationDisabled,

    #[error("registration opens at {opens_at}")]
    NotYetOpen { opens_at: DateTime<Utc> },

    #[error("registration closed at {closes_at}")]
    Closed { closes_at: DateTime<Utc> },

    #[error("user {0} is listed more than once")]
    DuplicateWaitlistEntry(UserId),

    #[error("user {0} is not on the waitlist")]
    NotWaitlisted(UserId),

    #[error("waitlist has {expected} entries but {actual} were given")]
    WaitlistSizeMismatch { expected: usize, actual: usize },
}

impl ValidationError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RegistrationDisabled => "registration_disabled",
            Self::NotYetOpen { .. } => "registration_not_open",
            Self::Closed { .. } => "registration_closed",
            Self::DuplicateWaitlistEntry(_) => "duplicate_waitlist_entry",
            Self::NotWaitlisted(_) => "not_waitlisted",
            Self::WaitlistSizeMismatch { .. } => "waitlist_size_mismatch",
        }
    }
}

/// Errors surfaced by the admission engine.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The event does not exist.
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// The request is not acceptable as-is.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A paid event has an open seat; the caller must go through payment.
    #[error("payment required to register for event {0}")]
    PaymentRequired(EventId),

    /// Capacity reached and the waitlist is disabled.
    #[error("event {0} is full")]
    EventFull(EventId),

    /// The event lock could not be acquired in time. Safe to retry.
    #[error("timed out waiting for event {0}")]
    LockTimeout(EventId),

    /// Storage failed; the unit of work was aborted.
    #[error("storage error: {0}")]
    Store(#[source] StoreError),
}

impl AdmissionError {
    /// Returns true if the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}

impl From<StoreError> for AdmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventNotFound(event_id) => Self::NotFound(event_id),
            StoreError::LockTimeout(event_id) => Self::LockTimeout(event_id),
            other => Self::Store(other),
        }
    }
}
