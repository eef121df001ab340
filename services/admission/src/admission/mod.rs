//! Admission engine.
//!
//! [`AdmissionService`] owns the storage backend, the notification dispatcher
//! and the clock. Every mutating operation follows the same shape:
//!
//! 1. open a unit of work on the event (takes the event lock)
//! 2. read, check, write
//! 3. run the reconciliation engine inside the same unit
//! 4. commit, or roll back on any error
//! 5. dispatch the post-commit outbox
//!
//! Notifications therefore never fire for work that did not commit, and a
//! failed notification never undoes work that did.

mod admin;
mod controller;
mod reconcile;

pub use admin::{OverrideRequest, ResequenceRequest};
pub use reconcile::reconcile_event;

use std::sync::Arc;

use rsvp_id::{EventId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::clock::{Clock, SystemClock};
use crate::error::AdmissionResult;
use crate::model::{EventAttributes, Registration, RegistrationStatus, WaitlistOrder};
use crate::notify::{NotificationDispatcher, NotificationTemplates, PostCommit, TracingDispatcher};
use crate::store::{LedgerStore, LedgerTx};

/// How admin overrides treat an event that is already at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCapacityPolicy {
    /// An override into a registered seat fails with `EventFull` when no seat
    /// is free.
    #[default]
    HardCap,
    /// Capacity is a target for automatic promotion only; admins may exceed it.
    SoftTarget,
}

impl AdminCapacityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardCap => "hard_cap",
            Self::SoftTarget => "soft_target",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard_cap" => Some(Self::HardCap),
            "soft_target" => Some(Self::SoftTarget),
            _ => None,
        }
    }
}

/// Tunables for the admission engine.
#[derive(Debug, Clone, Default)]
pub struct AdmissionOptions {
    pub admin_capacity_policy: AdminCapacityPolicy,
}

/// Result of a member registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_order: Option<WaitlistOrder>,
}

impl RegistrationOutcome {
    fn of(registration: &Registration) -> Self {
        Self {
            status: registration.status(),
            waitlist_order: registration.waitlist_order(),
        }
    }
}

/// The admission engine.
pub struct AdmissionService {
    store: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    templates: NotificationTemplates,
    options: AdmissionOptions,
}

impl AdmissionService {
    /// Creates a service with the system clock, logging dispatcher and
    /// default options.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            dispatcher: Arc::new(TracingDispatcher),
            clock: Arc::new(SystemClock),
            templates: NotificationTemplates::default(),
            options: AdmissionOptions::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_templates(mut self, templates: NotificationTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_options(mut self, options: AdmissionOptions) -> Self {
        self.options = options;
        self
    }

    /// Stores an event's attributes, then reconciles it so a raised capacity
    /// is filled from the waitlist. Lowering capacity never demotes anyone.
    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn upsert_event(&self, event: EventAttributes) -> AdmissionResult<Vec<UserId>> {
        self.store.upsert_event(&event).await?;
        self.reconcile_now(event.id).await
    }

    /// Current registration of `user_id` for `event_id`, if any.
    pub async fn registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> AdmissionResult<Option<Registration>> {
        Ok(self.store.get_registration(event_id, user_id).await?)
    }

    /// Checks the storage backend is reachable.
    pub async fn health_check(&self) -> AdmissionResult<()> {
        Ok(self.store.health_check().await?)
    }

    /// Commits `tx` if `result` is `Ok`, rolls it back otherwise, then sends
    /// the outbox of a committed unit.
    async fn finish<T>(
        &self,
        tx: Box<dyn LedgerTx>,
        result: AdmissionResult<(T, PostCommit)>,
    ) -> AdmissionResult<T> {
        let event_id = tx.event().id;
        match result {
            Ok((value, outbox)) => {
                tx.commit().await?;
                outbox.dispatch(&self.dispatcher).await;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        error = %rollback_err,
                        event_id = %event_id,
                        "Failed to roll back admission unit"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("hard_cap", Some(AdminCapacityPolicy::HardCap))]
    #[case("soft_target", Some(AdminCapacityPolicy::SoftTarget))]
    #[case("HardCap", None)]
    fn test_policy_parse(#[case] raw: &str, #[case] expected: Option<AdminCapacityPolicy>) {
        assert_eq!(AdminCapacityPolicy::parse(raw), expected);
    }

    #[test]
    fn test_policy_default_is_hard_cap() {
        assert_eq!(AdminCapacityPolicy::default(), AdminCapacityPolicy::HardCap);
        assert_eq!(AdminCapacityPolicy::default().as_str(), "hard_cap");
    }
}
