//! Shared fixtures for admission integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rsvp_admission::admission::{
    AdminCapacityPolicy, AdmissionOptions, AdmissionService, OverrideRequest,
};
use rsvp_admission::clock::ManualClock;
use rsvp_admission::model::{
    Capacity, EventAttributes, Intent, Registration, RegistrationStatus, WaitlistOrder,
};
use rsvp_admission::notify::{DispatchError, NotificationDispatcher};
use rsvp_admission::store::MemoryStore;
use rsvp_events::{Notification, NotificationKind};
use rsvp_id::{EventId, UserId};

/// Dispatcher that remembers what it was asked to send.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, user_id: UserId) -> Vec<NotificationKind> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.kind)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_notification(&self, notification: &Notification) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Unavailable("mail relay down".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub service: Arc<AdmissionService>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(AdminCapacityPolicy::HardCap)
    }

    pub fn with_policy(policy: AdminCapacityPolicy) -> Self {
        Self::build(policy, Duration::from_secs(5))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self::build(AdminCapacityPolicy::HardCap, lock_timeout)
    }

    fn build(policy: AdminCapacityPolicy, lock_timeout: Duration) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn,rsvp_admission=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let store = Arc::new(MemoryStore::new(lock_timeout));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap(),
        ));
        let service = AdmissionService::new(store.clone())
            .with_dispatcher(dispatcher.clone())
            .with_clock(clock.clone())
            .with_options(AdmissionOptions {
                admin_capacity_policy: policy,
            });

        Self {
            store,
            service: Arc::new(service),
            dispatcher,
            clock,
        }
    }

    /// Seeds a free event and returns its id.
    pub async fn event(&self, capacity: Capacity, waitlist: bool) -> EventId {
        let event = EventAttributes::new("Board Game Night", "board-game-night", capacity)
            .with_waitlist(waitlist);
        self.seed(event).await
    }

    pub async fn seed(&self, event: EventAttributes) -> EventId {
        let id = event.id;
        self.store.insert_event(event).await.unwrap();
        id
    }

    pub async fn yes(&self, event_id: EventId, user_id: UserId) -> RegistrationStatus {
        self.service
            .register_for_event(user_id, event_id, Intent::Yes)
            .await
            .unwrap()
            .status
    }

    pub async fn no(&self, event_id: EventId, user_id: UserId) -> RegistrationStatus {
        self.service
            .register_for_event(user_id, event_id, Intent::No)
            .await
            .unwrap()
            .status
    }

    pub async fn registration(&self, event_id: EventId, user_id: UserId) -> Registration {
        self.service
            .registration(event_id, user_id)
            .await
            .unwrap()
            .expect("registration should exist")
    }

    pub async fn status(&self, event_id: EventId, user_id: UserId) -> RegistrationStatus {
        self.registration(event_id, user_id).await.status()
    }

    pub async fn order(&self, event_id: EventId, user_id: UserId) -> Option<i64> {
        self.registration(event_id, user_id)
            .await
            .waitlist_order()
            .map(|o| o.value())
    }

    pub async fn count(&self, event_id: EventId, status: RegistrationStatus) -> usize {
        self.store
            .registrations(event_id)
            .await
            .iter()
            .filter(|r| r.status() == status)
            .count()
    }

    /// Verifies the no-oversell and ordering invariants on committed state.
    pub async fn assert_ledger_consistent(&self, event_id: EventId, capacity: Capacity) {
        let registrations = self.store.registrations(event_id).await;
        let registered = registrations.iter().filter(|r| r.is_registered()).count() as u32;
        let orders: Vec<WaitlistOrder> = registrations
            .iter()
            .filter_map(Registration::waitlist_order)
            .collect();
        let high_water = self.store.waitlist_high_water(event_id).await;
        rsvp_reconcile::check_ledger(capacity, registered, &orders, high_water)
            .expect("ledger invariants hold");
    }

    pub fn override_request(
        &self,
        event_id: EventId,
        admin_id: UserId,
        target_user_id: UserId,
        new_status: RegistrationStatus,
    ) -> OverrideRequest {
        OverrideRequest {
            admin_id,
            target_user_id,
            event_id,
            new_status,
            reason: Some("organizer discretion".to_string()),
            request_id: None,
        }
    }
}

pub fn users(n: usize) -> Vec<UserId> {
    (0..n).map(|_| UserId::new()).collect()
}
