//! Reconciliation engine: fills free seats from the waitlist.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rsvp_id::{EventId, UserId};
use rsvp_reconcile::{assess, plan_promotions, WaitlistCandidate};
use tracing::{debug, info, instrument};

use super::AdmissionService;
use crate::error::AdmissionResult;
use crate::model::{EventAttributes, PromotionSource, Registration, RegistrationStatus};
use crate::notify::PostCommit;
use crate::store::{LedgerTx, StoreError};

/// Promotes waitlisted registrations into free seats, lowest order first.
///
/// Must run inside the unit of work of the mutation that triggered it, so the
/// event lock is already held. Paid events are skipped. Returns the promoted
/// users in promotion order; sends nothing itself.
pub async fn reconcile_event(
    tx: &mut dyn LedgerTx,
    now: DateTime<Utc>,
) -> Result<Vec<UserId>, StoreError> {
    let event_id = tx.event().id;
    let capacity = tx.event().capacity;

    if tx.event().fee.is_paid() {
        debug!(event_id = %event_id, "Skipping reconciliation for paid event");
        return Ok(Vec::new());
    }

    let registered = tx.count_by_status(RegistrationStatus::Registered).await?;
    if !capacity.slots(registered).has_room() {
        debug!(event_id = %event_id, registered, "No free seats");
        return Ok(Vec::new());
    }

    let waitlisted = tx.list_waitlisted().await?;
    let candidates: Vec<WaitlistCandidate<UserId>> = waitlisted
        .iter()
        .filter_map(|r| {
            r.waitlist_order().map(|order| WaitlistCandidate {
                key: r.user_id,
                order,
                created_at: r.created_at,
            })
        })
        .collect();

    let plan = plan_promotions(capacity, registered, &candidates);
    let mut by_user: HashMap<UserId, Registration> =
        waitlisted.into_iter().map(|r| (r.user_id, r)).collect();

    for user_id in &plan {
        if let Some(mut registration) = by_user.remove(user_id) {
            registration.promote(PromotionSource::Auto, now);
            tx.update_registration(&registration).await?;
        }
    }

    let status = assess(
        capacity,
        registered + plan.len() as u32,
        by_user.len() as u32,
    );
    if status.is_converged() {
        debug!(
            event_id = %event_id,
            registered,
            promoted = plan.len(),
            "Reconciliation pass complete"
        );
    } else {
        // Only reachable when seats were oversold on purpose (soft-target
        // admin promotions) or capacity was lowered below the head count.
        info!(
            event_id = %event_id,
            registered,
            promoted = plan.len(),
            convergence = ?status,
            "Event above capacity after reconciliation"
        );
    }

    Ok(plan)
}

impl AdmissionService {
    /// Runs reconciliation for an event on its own, e.g. after its capacity
    /// was raised outside the admission engine.
    #[instrument(skip_all, fields(event_id = %event_id))]
    pub async fn reconcile_now(&self, event_id: EventId) -> AdmissionResult<Vec<UserId>> {
        let mut tx = self.store.begin(event_id).await?;
        let now = self.clock.now();

        let result = self.reconcile_in_tx(&mut *tx, now).await;
        let promoted = self.finish(tx, result).await?;
        if !promoted.is_empty() {
            info!(promoted = promoted.len(), "Promoted waitlisted registrations");
        }
        Ok(promoted)
    }

    async fn reconcile_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        now: DateTime<Utc>,
    ) -> AdmissionResult<(Vec<UserId>, PostCommit)> {
        let promoted = reconcile_event(tx, now).await?;
        let mut outbox = PostCommit::new();
        self.notify_promoted(&mut outbox, tx.event(), &promoted);
        Ok((promoted, outbox))
    }

    /// Queues a `waitlist_promoted` notification for each promoted user.
    pub(super) fn notify_promoted(
        &self,
        outbox: &mut PostCommit,
        event: &EventAttributes,
        promoted: &[UserId],
    ) {
        outbox.extend(
            promoted
                .iter()
                .map(|user_id| self.templates.waitlist_promoted(event, *user_id)),
        );
    }
}
