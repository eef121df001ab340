//! In-process ledger backend.
//!
//! Each event owns a `tokio::sync::Mutex` around its ledger. A unit of work
//! holds the owned guard for its whole lifetime and mutates a staged clone;
//! commit swaps the clone in, rollback or drop discards it. Events never
//! share a lock, so different events proceed in parallel.
//!
//! Commit also publishes the event's registrations to a read-side copy, so
//! point reads never wait on a unit of work.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rsvp_events::AuditRecord;
use rsvp_id::{EventId, UserId};
use rsvp_reconcile::next_waitlist_order;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::{LedgerStore, LedgerTx, StoreError};
use crate::model::{EventAttributes, Registration, RegistrationStatus, WaitlistOrder};

#[derive(Debug, Clone)]
struct EventLedger {
    attributes: EventAttributes,
    registrations: BTreeMap<UserId, Registration>,
    high_water: Option<WaitlistOrder>,
    audit: Vec<AuditRecord>,
}

impl EventLedger {
    fn new(attributes: EventAttributes) -> Self {
        Self {
            attributes,
            registrations: BTreeMap::new(),
            high_water: None,
            audit: Vec::new(),
        }
    }
}

type Published = Arc<RwLock<BTreeMap<UserId, Registration>>>;

#[derive(Clone)]
struct EventSlot {
    ledger: Arc<Mutex<EventLedger>>,
    published: Published,
}

impl EventSlot {
    fn new(attributes: EventAttributes) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(EventLedger::new(attributes))),
            published: Arc::default(),
        }
    }
}

/// In-memory [`LedgerStore`].
pub struct MemoryStore {
    events: RwLock<HashMap<EventId, EventSlot>>,
    lock_timeout: Duration,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            lock_timeout,
            fail_audit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds an event, or replaces the attributes of an existing one while
    /// keeping its ledger. Replacing waits for any in-flight unit of work on
    /// the event, for at most the lock timeout.
    pub async fn insert_event(&self, attributes: EventAttributes) -> Result<(), StoreError> {
        let event_id = attributes.id;
        let slot = match self.events.write().await.entry(event_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                entry.insert(EventSlot::new(attributes));
                return Ok(());
            }
        };

        let mut ledger = tokio::time::timeout(self.lock_timeout, slot.ledger.lock())
            .await
            .map_err(|_| StoreError::LockTimeout(event_id))?;
        ledger.attributes = attributes;
        Ok(())
    }

    /// Committed registrations for an event, in no particular order.
    pub async fn registrations(&self, event_id: EventId) -> Vec<Registration> {
        match self.slot(event_id).await {
            Some(slot) => slot.published.read().await.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Committed audit records for an event, oldest first.
    pub async fn audit_log(&self, event_id: EventId) -> Vec<AuditRecord> {
        match self.slot(event_id).await {
            Some(slot) => slot.ledger.lock().await.audit.clone(),
            None => Vec::new(),
        }
    }

    /// Committed waitlist high-water mark for an event.
    pub async fn waitlist_high_water(&self, event_id: EventId) -> Option<WaitlistOrder> {
        match self.slot(event_id).await {
            Some(slot) => slot.ledger.lock().await.high_water,
            None => None,
        }
    }

    /// Makes every subsequent audit write fail. Used to exercise abort paths.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    async fn slot(&self, event_id: EventId) -> Option<EventSlot> {
        self.events.read().await.get(&event_id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self, event_id: EventId) -> Result<Box<dyn LedgerTx>, StoreError> {
        let slot = self
            .slot(event_id)
            .await
            .ok_or(StoreError::EventNotFound(event_id))?;

        let guard = tokio::time::timeout(self.lock_timeout, slot.ledger.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(event_id))?;

        debug!(event_id = %event_id, "Acquired in-memory event lock");

        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            published: slot.published,
            fail_audit: Arc::clone(&self.fail_audit),
        }))
    }

    async fn upsert_event(&self, event: &EventAttributes) -> Result<(), StoreError> {
        self.insert_event(event.clone()).await
    }

    async fn get_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError> {
        let slot = self
            .slot(event_id)
            .await
            .ok_or(StoreError::EventNotFound(event_id))?;
        let published = slot.published.read().await;
        Ok(published.get(&user_id).cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<EventLedger>,
    staged: EventLedger,
    published: Published,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryTx {
    fn event_id(&self) -> EventId {
        self.staged.attributes.id
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    fn event(&self) -> &EventAttributes {
        &self.staged.attributes
    }

    async fn find_registration(
        &mut self,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self.staged.registrations.get(&user_id).cloned())
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        if self.staged.registrations.contains_key(&registration.user_id) {
            return Err(StoreError::DuplicateRegistration {
                event_id: self.event_id(),
                user_id: registration.user_id,
            });
        }
        self.staged
            .registrations
            .insert(registration.user_id, registration.clone());
        Ok(())
    }

    async fn update_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        let event_id = self.event_id();
        let Some(slot) = self.staged.registrations.get_mut(&registration.user_id) else {
            return Err(StoreError::RegistrationNotFound {
                event_id,
                user_id: registration.user_id,
            });
        };
        *slot = registration.clone();
        Ok(())
    }

    async fn count_by_status(&mut self, status: RegistrationStatus) -> Result<u32, StoreError> {
        let count = self
            .staged
            .registrations
            .values()
            .filter(|r| r.status() == status)
            .count();
        Ok(count as u32)
    }

    async fn max_waitlist_order(&mut self) -> Result<Option<WaitlistOrder>, StoreError> {
        Ok(self.staged.high_water)
    }

    async fn next_waitlist_order(&mut self) -> Result<WaitlistOrder, StoreError> {
        let order = next_waitlist_order(self.staged.high_water);
        self.staged.high_water = Some(order);
        Ok(order)
    }

    async fn list_waitlisted(&mut self) -> Result<Vec<Registration>, StoreError> {
        let mut waitlisted: Vec<Registration> = self
            .staged
            .registrations
            .values()
            .filter(|r| r.status() == RegistrationStatus::Waitlisted)
            .cloned()
            .collect();
        waitlisted.sort_by(|a, b| {
            a.waitlist_order()
                .cmp(&b.waitlist_order())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(waitlisted)
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Audit("audit sink unavailable".to_string()));
        }
        self.staged.audit.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard,
            staged,
            published,
            ..
        } = *self;
        *published.write().await = staged.registrations.clone();
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
