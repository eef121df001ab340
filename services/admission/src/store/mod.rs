//! Storage seam for the admission core.
//!
//! A [`LedgerStore`] hands out [`LedgerTx`] units of work. Opening one takes
//! the exclusive lock for a single event and loads its attributes; every read
//! and write the admission engine performs for that event goes through the
//! same unit, and the lock is held until [`LedgerTx::commit`] or
//! [`LedgerTx::rollback`] (or until the unit is dropped, which rolls back).
//!
//! Two backends are provided:
//! - [`MemoryStore`]: in-process per-event mutex over a staged copy of the
//!   event's ledger. Single-process deployments and tests.
//! - [`crate::db::PgLedgerStore`]: `SELECT ... FOR UPDATE` on the event row
//!   inside a Postgres transaction. Multi-instance deployments.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use rsvp_events::{AuditRecord, EventError};
use rsvp_id::{EventId, UserId};
use thiserror::Error;

use crate::db::DbError;
use crate::model::{EventAttributes, Registration, RegistrationStatus, WaitlistOrder};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No event with this id.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// The event lock (or the transaction holding it) timed out.
    #[error("lock timeout on event {0}")]
    LockTimeout(EventId),

    /// A second registration for the same (event, user).
    #[error("registration for user {user_id} on event {event_id} already exists")]
    DuplicateRegistration { event_id: EventId, user_id: UserId },

    /// Update of a registration that was never inserted.
    #[error("registration for user {user_id} on event {event_id} not found")]
    RegistrationNotFound { event_id: EventId, user_id: UserId },

    /// Audit write failed; the enclosing unit must abort.
    #[error("audit write failed: {0}")]
    Audit(String),

    /// Audit record could not be built or encoded.
    #[error("audit record invalid: {0}")]
    AuditRecord(#[from] EventError),

    /// A stored row violates the model (e.g. an order on a registered row).
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),

    /// Database failure.
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Factory for locked units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Locks `event_id` and loads its attributes.
    ///
    /// # Errors
    ///
    /// [`StoreError::EventNotFound`] if the event does not exist,
    /// [`StoreError::LockTimeout`] if the lock is not granted in time.
    async fn begin(&self, event_id: EventId) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Creates an event or replaces its admission attributes, keeping its
    /// registrations. Waits behind any unit of work holding the event lock,
    /// failing with [`StoreError::LockTimeout`] like `begin` does.
    async fn upsert_event(&self, event: &EventAttributes) -> Result<(), StoreError>;

    /// Point read of committed state for status queries. Never waits on the
    /// event lock.
    async fn get_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError>;

    /// Checks the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// A unit of work holding one event's exclusive lock.
#[async_trait]
pub trait LedgerTx: Send {
    /// Attributes of the locked event, as loaded by `begin`.
    fn event(&self) -> &EventAttributes;

    async fn find_registration(
        &mut self,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError>;

    async fn insert_registration(&mut self, registration: &Registration)
        -> Result<(), StoreError>;

    async fn update_registration(&mut self, registration: &Registration)
        -> Result<(), StoreError>;

    async fn count_by_status(&mut self, status: RegistrationStatus) -> Result<u32, StoreError>;

    /// Largest waitlist order ever issued for the event, including orders
    /// whose holders have since left the waitlist.
    async fn max_waitlist_order(&mut self) -> Result<Option<WaitlistOrder>, StoreError>;

    /// Issues the next waitlist order (`max + 1`) and records it as the new
    /// high-water mark, so it is never issued again.
    async fn next_waitlist_order(&mut self) -> Result<WaitlistOrder, StoreError>;

    /// Waitlisted registrations in promotion order (order, then created_at).
    async fn list_waitlisted(&mut self) -> Result<Vec<Registration>, StoreError>;

    async fn append_audit(&mut self, record: &AuditRecord) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
