//! Administrative paths: status overrides and waitlist resequencing.
//!
//! Both bypass the member registration gate, write an audit record in the
//! same unit of work as the change (an audit failure aborts the change), and
//! re-run reconciliation before committing.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rsvp_events::{action_types, ActorType, AuditRecord, EntityType};
use rsvp_id::{EventId, RequestId, UserId};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{reconcile_event, AdminCapacityPolicy, AdmissionService};
use crate::error::{AdmissionError, AdmissionResult, ValidationError};
use crate::model::{
    Placement, PromotionSource, Registration, RegistrationStatus, WaitlistOrder,
};
use crate::notify::PostCommit;
use crate::store::{LedgerTx, StoreError};

/// An administrator setting a user's status directly.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub admin_id: UserId,
    pub target_user_id: UserId,
    pub event_id: EventId,
    pub new_status: RegistrationStatus,
    pub reason: Option<String>,
    pub request_id: Option<RequestId>,
}

/// An administrator reordering an event's waitlist.
#[derive(Debug, Clone)]
pub struct ResequenceRequest {
    pub admin_id: UserId,
    pub event_id: EventId,
    /// Every currently waitlisted user, exactly once, first to promote first.
    pub user_ids: Vec<UserId>,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Serialize)]
struct WaitlistEntry {
    user_id: UserId,
    waitlist_order: Option<WaitlistOrder>,
}

impl AdmissionService {
    /// Sets a user's status for an event on an administrator's authority.
    ///
    /// Moving a user into a registered seat from any other state is an admin
    /// promotion: it is tagged [`PromotionSource::Admin`] and the user gets an
    /// `admin_promoted` notification. Under [`AdminCapacityPolicy::HardCap`]
    /// such a move fails with [`AdmissionError::EventFull`] when no seat is
    /// free.
    #[instrument(
        skip_all,
        fields(
            event_id = %request.event_id,
            admin_id = %request.admin_id,
            target_user_id = %request.target_user_id,
            new_status = %request.new_status
        )
    )]
    pub async fn admin_override_registration(&self, request: OverrideRequest) -> AdmissionResult<()> {
        let mut tx = self.store.begin(request.event_id).await?;
        let now = self.clock.now();

        let result = self.override_in_tx(&mut *tx, &request, now).await;
        let promoted = self.finish(tx, result).await?;

        info!(promoted = promoted.len(), "Admin override applied");
        Ok(())
    }

    async fn override_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        request: &OverrideRequest,
        now: DateTime<Utc>,
    ) -> AdmissionResult<(Vec<UserId>, PostCommit)> {
        let event = tx.event().clone();
        let target = request.target_user_id;

        let existing = tx.find_registration(target).await?;
        let before = existing.as_ref().map(Registration::snapshot);
        let was_registered = existing.as_ref().is_some_and(Registration::is_registered);

        let placement = match request.new_status {
            RegistrationStatus::Registered => {
                if !was_registered
                    && self.options.admin_capacity_policy == AdminCapacityPolicy::HardCap
                {
                    let registered = tx.count_by_status(RegistrationStatus::Registered).await?;
                    if !event.capacity.admits_one_more(registered) {
                        return Err(AdmissionError::EventFull(event.id));
                    }
                }
                Placement::Registered
            }
            RegistrationStatus::Waitlisted => {
                let order = match existing.as_ref().and_then(Registration::waitlist_order) {
                    Some(order) => order,
                    None => tx.next_waitlist_order().await?,
                };
                Placement::Waitlisted(order)
            }
            RegistrationStatus::NotAttending => Placement::NotAttending,
        };

        let admin_promotion = !was_registered && placement == Placement::Registered;
        let is_new = existing.is_none();
        let mut registration = existing
            .unwrap_or_else(|| Registration::new(event.id, target, placement, now));
        if admin_promotion {
            registration.promote(PromotionSource::Admin, now);
        } else {
            registration.place(placement, now);
        }
        registration.status_reason = request.reason.clone();

        if is_new {
            tx.insert_registration(&registration).await?;
        } else {
            tx.update_registration(&registration).await?;
        }

        let record = AuditRecord::builder()
            .occurred_at(now)
            .actor(ActorType::Admin, request.admin_id)
            .action_type(action_types::REGISTRATION_ADMIN_OVERRIDE)
            .entity(EntityType::Registration, registration.id.to_string())
            .event_id(event.id)
            .target_user_id(target)
            .summary(format!(
                "Admin set registration of {} to {}",
                target, request.new_status
            ))
            .change(&before, &registration.snapshot())
            .map_err(StoreError::from)?
            .metadata(json!({
                "reason": request.reason,
                "admin_promotion": admin_promotion,
                "capacity_policy": self.options.admin_capacity_policy.as_str(),
            }))
            .request_id(request.request_id)
            .build()
            .map_err(StoreError::from)?;
        tx.append_audit(&record).await?;

        let promoted = reconcile_event(tx, now).await?;

        let mut outbox = PostCommit::new();
        if admin_promotion {
            outbox.push(self.templates.admin_promoted(&event, target));
        }
        self.notify_promoted(&mut outbox, &event, &promoted);

        Ok((promoted, outbox))
    }

    /// Replaces the order of an event's waitlist.
    ///
    /// `user_ids` must name every waitlisted user exactly once. Fresh orders
    /// are issued in list order above the event's high-water mark, so no
    /// order is ever reused.
    #[instrument(
        skip_all,
        fields(event_id = %request.event_id, admin_id = %request.admin_id, entries = request.user_ids.len())
    )]
    pub async fn resequence_waitlist(&self, request: ResequenceRequest) -> AdmissionResult<()> {
        let mut tx = self.store.begin(request.event_id).await?;
        let now = self.clock.now();

        let result = self.resequence_in_tx(&mut *tx, &request, now).await;
        self.finish(tx, result).await?;

        info!("Waitlist resequenced");
        Ok(())
    }

    async fn resequence_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        request: &ResequenceRequest,
        now: DateTime<Utc>,
    ) -> AdmissionResult<((), PostCommit)> {
        let event = tx.event().clone();

        let waitlisted = tx.list_waitlisted().await?;
        validate_resequence(&waitlisted, &request.user_ids)?;

        let before: Vec<WaitlistEntry> = waitlisted
            .iter()
            .map(|r| WaitlistEntry {
                user_id: r.user_id,
                waitlist_order: r.waitlist_order(),
            })
            .collect();

        let previous_high_water = tx.max_waitlist_order().await?;

        let mut by_user: HashMap<UserId, Registration> =
            waitlisted.into_iter().map(|r| (r.user_id, r)).collect();
        let mut after = Vec::with_capacity(request.user_ids.len());
        for user_id in &request.user_ids {
            let Some(mut registration) = by_user.remove(user_id) else {
                continue;
            };
            let order = tx.next_waitlist_order().await?;
            registration.place(Placement::Waitlisted(order), now);
            tx.update_registration(&registration).await?;
            after.push(WaitlistEntry {
                user_id: *user_id,
                waitlist_order: Some(order),
            });
        }

        let record = AuditRecord::builder()
            .occurred_at(now)
            .actor(ActorType::Admin, request.admin_id)
            .action_type(action_types::WAITLIST_RESEQUENCED)
            .entity(EntityType::Waitlist, event.id.to_string())
            .event_id(event.id)
            .summary(format!("Admin resequenced {} waitlist entries", after.len()))
            .change(&before, &after)
            .map_err(StoreError::from)?
            .metadata(json!({
                "previous_high_water": previous_high_water.map(|o| o.value()),
            }))
            .request_id(request.request_id)
            .build()
            .map_err(StoreError::from)?;
        tx.append_audit(&record).await?;

        let promoted = reconcile_event(tx, now).await?;
        let mut outbox = PostCommit::new();
        self.notify_promoted(&mut outbox, &event, &promoted);

        Ok(((), outbox))
    }
}

fn validate_resequence(
    waitlisted: &[Registration],
    user_ids: &[UserId],
) -> Result<(), ValidationError> {
    let current: HashSet<UserId> = waitlisted.iter().map(|r| r.user_id).collect();
    let mut seen = HashSet::with_capacity(user_ids.len());
    for user_id in user_ids {
        if !seen.insert(*user_id) {
            return Err(ValidationError::DuplicateWaitlistEntry(*user_id));
        }
        if !current.contains(user_id) {
            return Err(ValidationError::NotWaitlisted(*user_id));
        }
    }
    if user_ids.len() != current.len() {
        return Err(ValidationError::WaitlistSizeMismatch {
            expected: current.len(),
            actual: user_ids.len(),
        });
    }
    Ok(())
}
