//! Post-commit notification delivery.

mod common;

use common::{users, Harness};
use rsvp_admission::model::{Capacity, Intent, RegistrationStatus};
use rsvp_admission::store::LedgerStore;
use rsvp_events::NotificationKind;

#[tokio::test]
async fn direct_registration_confirms_once() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(2), true).await;
    let user = users(1)[0];

    h.yes(event, user).await;
    h.yes(event, user).await;

    assert_eq!(
        h.dispatcher.kinds_for(user),
        vec![NotificationKind::RegistrationConfirmed]
    );
    let sent = h.dispatcher.sent();
    assert_eq!(
        sent[0].action_url.as_deref(),
        Some("http://localhost:3000/events/board-game-night")
    );
}

#[tokio::test]
async fn waitlisting_sends_nothing_and_promotion_notifies() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(3);
    for user in &u {
        h.yes(event, *user).await;
    }
    assert!(h.dispatcher.kinds_for(u[1]).is_empty());
    assert!(h.dispatcher.kinds_for(u[2]).is_empty());

    h.no(event, u[0]).await;

    assert_eq!(
        h.dispatcher.kinds_for(u[1]),
        vec![NotificationKind::WaitlistPromoted]
    );
    assert!(h.dispatcher.kinds_for(u[2]).is_empty());
}

#[tokio::test]
async fn failed_delivery_does_not_undo_admission() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(2);
    h.dispatcher.fail_sends(true);

    let outcome = h
        .service
        .register_for_event(u[0], event, Intent::Yes)
        .await
        .unwrap();
    assert_eq!(outcome.status, RegistrationStatus::Registered);
    h.yes(event, u[1]).await;
    h.no(event, u[0]).await;

    assert_eq!(h.status(event, u[0]).await, RegistrationStatus::NotAttending);
    assert_eq!(h.status(event, u[1]).await, RegistrationStatus::Registered);
    assert!(h.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn failed_unit_sends_nothing() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), false).await;
    let u = users(2);
    h.yes(event, u[0]).await;
    h.dispatcher.clear();

    assert!(h
        .service
        .register_for_event(u[1], event, Intent::Yes)
        .await
        .is_err());
    assert!(h.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn nothing_is_sent_while_the_unit_is_open() {
    let h = Harness::new();
    let event = h.event(Capacity::Limited(1), true).await;
    let u = users(2);
    h.yes(event, u[0]).await;
    h.yes(event, u[1]).await;
    h.dispatcher.clear();

    let held = h.store.begin(event).await.unwrap();
    let service = h.service.clone();
    let leaver = u[0];
    let pending = tokio::spawn(async move {
        service.register_for_event(leaver, event, Intent::No).await
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.dispatcher.sent().is_empty());

    held.rollback().await.unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(
        h.dispatcher.kinds_for(u[1]),
        vec![NotificationKind::WaitlistPromoted]
    );
}
