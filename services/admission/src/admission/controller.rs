//! Member-facing admission: a user says YES or NO to an event.

use chrono::{DateTime, Utc};
use rsvp_id::{EventId, UserId};
use tracing::{info, instrument};

use super::{reconcile_event, AdmissionService, RegistrationOutcome};
use crate::error::{AdmissionError, AdmissionResult};
use crate::model::{EventAttributes, Intent, Placement, Registration, RegistrationStatus};
use crate::notify::PostCommit;
use crate::store::LedgerTx;

impl AdmissionService {
    /// Records a member's intent for an event and places them.
    ///
    /// Runs under the event lock: capacity is read, the caller placed, and
    /// the waitlist reconciled in one unit of work.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::NotFound`] if the event does not exist
    /// - [`AdmissionError::Validation`] if registration is disabled or the
    ///   window is closed
    /// - [`AdmissionError::PaymentRequired`] for a paid event with a free seat
    /// - [`AdmissionError::EventFull`] if no seat is free and the waitlist is off
    /// - [`AdmissionError::LockTimeout`] if the event lock was not granted
    #[instrument(skip_all, fields(event_id = %event_id, user_id = %user_id, intent = ?intent))]
    pub async fn register_for_event(
        &self,
        user_id: UserId,
        event_id: EventId,
        intent: Intent,
    ) -> AdmissionResult<RegistrationOutcome> {
        let mut tx = self.store.begin(event_id).await?;
        let now = self.clock.now();

        let result = self.register_in_tx(&mut *tx, user_id, intent, now).await;
        let outcome = self.finish(tx, result).await?;

        info!(
            status = %outcome.status,
            waitlist_order = outcome.waitlist_order.map(|o| o.value()),
            "Registration recorded"
        );
        Ok(outcome)
    }

    async fn register_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        user_id: UserId,
        intent: Intent,
        now: DateTime<Utc>,
    ) -> AdmissionResult<(RegistrationOutcome, PostCommit)> {
        let event = tx.event().clone();
        event.check_member_access(now)?;

        let existing = tx.find_registration(user_id).await?;
        let was_registered = existing.as_ref().is_some_and(Registration::is_registered);

        let placement = match intent {
            Intent::No => Placement::NotAttending,
            Intent::Yes => place_yes(tx, &event, existing.as_ref()).await?,
        };

        let registration = match existing {
            Some(mut registration) => {
                registration.place(placement, now);
                tx.update_registration(&registration).await?;
                registration
            }
            None => {
                let registration = Registration::new(event.id, user_id, placement, now);
                tx.insert_registration(&registration).await?;
                registration
            }
        };

        let promoted = reconcile_event(tx, now).await?;

        let mut outbox = PostCommit::new();
        if registration.is_registered() && !was_registered {
            outbox.push(self.templates.registration_confirmed(&event, user_id));
        }
        self.notify_promoted(&mut outbox, &event, &promoted);

        Ok((RegistrationOutcome::of(&registration), outbox))
    }
}

/// Decides where a YES lands.
///
/// A caller who already holds a seat keeps it. Otherwise a free seat means
/// REGISTERED (unless the event is paid), no free seat means WAITLISTED when
/// the waitlist is on. A caller already on the waitlist keeps their order.
async fn place_yes(
    tx: &mut dyn LedgerTx,
    event: &EventAttributes,
    existing: Option<&Registration>,
) -> AdmissionResult<Placement> {
    if existing.is_some_and(Registration::is_registered) {
        return Ok(Placement::Registered);
    }

    // The caller holds no seat here, so this count already excludes them.
    let registered = tx.count_by_status(RegistrationStatus::Registered).await?;
    let has_room = event.capacity.admits_one_more(registered);

    // Paid seats are sold elsewhere; only a waitlist entry can be taken here.
    if event.fee.is_paid() && (has_room || !event.waitlist_enabled) {
        return Err(AdmissionError::PaymentRequired(event.id));
    }

    if has_room {
        return Ok(Placement::Registered);
    }
    if !event.waitlist_enabled {
        return Err(AdmissionError::EventFull(event.id));
    }

    let order = match existing.and_then(Registration::waitlist_order) {
        Some(order) => order,
        None => tx.next_waitlist_order().await?,
    };
    Ok(Placement::Waitlisted(order))
}
