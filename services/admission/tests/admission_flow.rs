//! Member admission flows against the in-memory ledger.

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{users, Harness};
use rsvp_admission::clock::Clock;
use rsvp_admission::error::{AdmissionError, ValidationError};
use rsvp_admission::model::{
    Capacity, EventAttributes, Fee, Intent, PromotionSource, RegistrationStatus,
    RegistrationWindow,
};
use rsvp_id::{EventId, UserId};
use rstest::rstest;

use RegistrationStatus::{NotAttending, Registered, Waitlisted};

#[tokio::test]
async fn capacity_two_with_waitlist_fills_then_queues() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(2), true).await;
    let u = users(4);

    assert_eq!(h.yes(event, u[0]).await, Registered);
    assert_eq!(h.yes(event, u[1]).await, Registered);
    assert_eq!(h.yes(event, u[2]).await, Waitlisted);
    assert_eq!(h.yes(event, u[3]).await, Waitlisted);

    assert_eq!(h.order(event, u[2]).await, Some(1));
    assert_eq!(h.order(event, u[3]).await, Some(2));
    h.assert_ledger_consistent(event, Capacity::Limited(2)).await;
}

#[tokio::test]
async fn leaving_promotes_head_of_waitlist() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(2), true).await;
    let u = users(4);
    for user in &u {
        h.yes(event, *user).await;
    }

    assert_eq!(h.no(event, u[0]).await, NotAttending);

    let promoted = h.registration(event, u[2]).await;
    assert_eq!(promoted.status(), Registered);
    assert_eq!(promoted.waitlist_order(), None);
    assert_eq!(promoted.promotion_source, Some(PromotionSource::Auto));
    assert_eq!(promoted.promoted_at, Some(h.clock.now()));

    assert_eq!(h.status(event, u[3]).await, Waitlisted);
    assert_eq!(h.order(event, u[3]).await, Some(2));
    assert_eq!(h.order(event, u[0]).await, None);
    h.assert_ledger_consistent(event, Capacity::Limited(2)).await;
}

#[tokio::test]
async fn direct_seat_after_promotion_drops_promotion_source() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(2);
    h.yes(event, u[0]).await;
    h.yes(event, u[1]).await;

    h.no(event, u[0]).await;
    assert_eq!(
        h.registration(event, u[1]).await.promotion_source,
        Some(PromotionSource::Auto)
    );

    h.no(event, u[1]).await;
    assert_eq!(h.yes(event, u[1]).await, Registered);

    let reg = h.registration(event, u[1]).await;
    assert_eq!(reg.promotion_source, None);
    assert_eq!(reg.promoted_at, None);
}

#[tokio::test]
async fn paid_event_full_takes_waitlist_without_payment() {
    let h = Harness::new();
    let event = h
        .seed(
            EventAttributes::new("Gala", "gala", Capacity::Limited(1))
                .with_waitlist(true)
                .with_fee(Fee::Paid { cents: 500 }),
        )
        .await;
    let u = users(2);

    // Seat taken through the payment flow, modelled here as an admin placement.
    h.service
        .admin_override_registration(h.override_request(event, UserId::new(), u[0], Registered))
        .await
        .unwrap();

    assert_eq!(h.yes(event, u[1]).await, Waitlisted);
    assert_eq!(h.order(event, u[1]).await, Some(1));
}

#[tokio::test]
async fn paid_event_with_open_seat_requires_payment() {
    let h = Harness::new();
    let event = h
        .seed(
            EventAttributes::new("Gala", "gala", Capacity::Limited(2))
                .with_waitlist(true)
                .with_fee(Fee::Paid { cents: 500 }),
        )
        .await;
    let u = users(2);
    h.service
        .admin_override_registration(h.override_request(event, UserId::new(), u[0], Registered))
        .await
        .unwrap();

    let err = h
        .service
        .register_for_event(u[1], event, Intent::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::PaymentRequired(id) if id == event));
    assert!(h.service.registration(event, u[1]).await.unwrap().is_none());
}

#[tokio::test]
async fn paid_event_never_auto_promotes() {
    let h = Harness::new();
    let event = h
        .seed(
            EventAttributes::new("Gala", "gala", Capacity::Limited(1))
                .with_waitlist(true)
                .with_fee(Fee::Paid { cents: 500 }),
        )
        .await;
    let u = users(2);
    h.service
        .admin_override_registration(h.override_request(event, UserId::new(), u[0], Registered))
        .await
        .unwrap();
    h.yes(event, u[1]).await;

    h.no(event, u[0]).await;

    assert_eq!(h.status(event, u[1]).await, Waitlisted);
}

#[tokio::test]
async fn full_event_without_waitlist_rejects() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), false).await;
    let u = users(2);
    h.yes(event, u[0]).await;

    let err = h
        .service
        .register_for_event(u[1], event, Intent::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::EventFull(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn re_entry_after_leaving_registers_again() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(2);

    h.yes(event, u[0]).await;
    h.yes(event, u[1]).await;
    h.no(event, u[1]).await;
    assert_eq!(h.order(event, u[1]).await, None);

    h.no(event, u[0]).await;
    assert_eq!(h.yes(event, u[1]).await, Registered);
    assert_eq!(h.order(event, u[1]).await, None);
}

#[tokio::test]
async fn rejoining_waitlist_gets_fresh_order() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(3);
    h.yes(event, u[0]).await;
    h.yes(event, u[1]).await;
    h.yes(event, u[2]).await;

    h.no(event, u[1]).await;
    assert_eq!(h.yes(event, u[1]).await, Waitlisted);

    // Order 1 is gone for good; the rejoiner queues behind u[2].
    assert_eq!(h.order(event, u[2]).await, Some(2));
    assert_eq!(h.order(event, u[1]).await, Some(3));
    h.assert_ledger_consistent(event, Capacity::Limited(1)).await;
}

#[tokio::test]
async fn repeated_yes_keeps_status_and_order() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(2);
    h.yes(event, u[0]).await;
    h.yes(event, u[1]).await;

    assert_eq!(h.yes(event, u[0]).await, Registered);
    assert_eq!(h.yes(event, u[1]).await, Waitlisted);
    assert_eq!(h.order(event, u[1]).await, Some(1));
    assert_eq!(h.store.waitlist_high_water(event).await.map(|o| o.value()), Some(1));
}

#[tokio::test]
async fn no_without_prior_record_creates_not_attending() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), false).await;
    let user = UserId::new();

    assert_eq!(h.no(event, user).await, NotAttending);
    assert_eq!(h.status(event, user).await, NotAttending);
    assert_eq!(h.count(event, Registered).await, 0);
}

#[tokio::test]
async fn unlimited_capacity_always_registers() {
    let h = Harness::new();
    let event = h.event(Capacity::Unlimited, true).await;
    for user in users(25) {
        assert_eq!(h.yes(event, user).await, Registered);
    }
    assert_eq!(h.store.waitlist_high_water(event).await, None);
}

#[tokio::test]
async fn frees_promote_lowest_orders_first() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(3), true).await;
    let u = users(8);
    for user in &u {
        h.yes(event, *user).await;
    }

    h.no(event, u[0]).await;
    h.no(event, u[1]).await;

    assert_eq!(h.status(event, u[3]).await, Registered);
    assert_eq!(h.status(event, u[4]).await, Registered);
    for user in &u[5..] {
        assert_eq!(h.status(event, *user).await, Waitlisted);
    }
    assert_eq!(h.order(event, u[5]).await, Some(3));
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(3);
    for user in &u {
        h.yes(event, *user).await;
    }
    h.no(event, u[0]).await;

    let before = h.store.registrations(event).await;
    assert!(h.service.reconcile_now(event).await.unwrap().is_empty());
    assert!(h.service.reconcile_now(event).await.unwrap().is_empty());
    assert_eq!(h.store.registrations(event).await, before);
}

#[tokio::test]
async fn raising_capacity_then_reconciling_fills_seats() {
    let h = Harness::new();
    let mut attrs = EventAttributes::new("Workshop", "workshop", Capacity::Limited(1))
        .with_waitlist(true);
    let event = h.seed(attrs.clone()).await;
    let u = users(4);
    for user in &u {
        h.yes(event, *user).await;
    }

    attrs.capacity = Capacity::Limited(3);
    let promoted = h.service.upsert_event(attrs).await.unwrap();

    assert_eq!(promoted, vec![u[1], u[2]]);
    assert_eq!(h.status(event, u[3]).await, Waitlisted);
}

fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, 0, 0, 0).unwrap()
}

fn windowed(opens_at: Option<DateTime<Utc>>, closes_at: Option<DateTime<Utc>>) -> EventAttributes {
    EventAttributes::new("Talk", "talk", Capacity::Limited(5))
        .with_window(RegistrationWindow { opens_at, closes_at })
}

#[rstest]
#[case::disabled(
    EventAttributes::new("Closed", "closed", Capacity::Limited(5)).with_registration_enabled(false),
    "registration_disabled"
)]
#[case::not_yet_open(windowed(Some(day(4, 1)), None), "registration_not_open")]
#[case::closed(windowed(None, Some(day(3, 1))), "registration_closed")]
#[tokio::test]
async fn member_gate_rejects(#[case] event: EventAttributes, #[case] code: &str) {
    let h = Harness::new();
    let event_id = h.seed(event).await;

    for intent in [Intent::Yes, Intent::No] {
        let err = h
            .service
            .register_for_event(UserId::new(), event_id, intent)
            .await
            .unwrap_err();
        match err {
            AdmissionError::Validation(v) => assert_eq!(v.code(), code),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn registration_window_bounds_are_enforced() {
    let h = Harness::new();
    let now = h.clock.now();
    let window = RegistrationWindow {
        opens_at: Some(now + Duration::hours(1)),
        closes_at: Some(now + Duration::hours(2)),
    };
    let event = h
        .seed(EventAttributes::new("Talk", "talk", Capacity::Limited(5)).with_window(window))
        .await;
    let user = UserId::new();

    let err = h
        .service
        .register_for_event(user, event, Intent::Yes)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Validation(ValidationError::NotYetOpen { .. })
    ));

    h.clock.advance(Duration::minutes(90));
    assert_eq!(h.yes(event, user).await, Registered);

    h.clock.advance(Duration::hours(1));
    let err = h
        .service
        .register_for_event(user, event, Intent::No)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Validation(ValidationError::Closed { .. })
    ));
    assert_eq!(h.status(event, user).await, Registered);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .register_for_event(UserId::new(), EventId::new(), Intent::Yes)
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::NotFound(_)));
}
