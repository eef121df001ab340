//! Notification copy for admission outcomes.

use rsvp_events::{Notification, NotificationKind};
use rsvp_id::UserId;

use crate::model::EventAttributes;

/// Builds user-facing notifications for an event.
#[derive(Debug, Clone)]
pub struct NotificationTemplates {
    public_base_url: String,
}

impl NotificationTemplates {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        let mut public_base_url = public_base_url.into();
        while public_base_url.ends_with('/') {
            public_base_url.pop();
        }
        Self { public_base_url }
    }

    pub fn event_url(&self, event: &EventAttributes) -> String {
        format!("{}/events/{}", self.public_base_url, event.slug)
    }

    pub fn registration_confirmed(&self, event: &EventAttributes, user_id: UserId) -> Notification {
        self.build(
            event,
            user_id,
            NotificationKind::RegistrationConfirmed,
            format!("You're registered for {}", event.title),
            format!("Your spot at {} is confirmed.", event.title),
        )
    }

    pub fn waitlist_promoted(&self, event: &EventAttributes, user_id: UserId) -> Notification {
        self.build(
            event,
            user_id,
            NotificationKind::WaitlistPromoted,
            format!("A spot opened up for {}", event.title),
            format!(
                "You've been moved off the waitlist and are now registered for {}.",
                event.title
            ),
        )
    }

    pub fn admin_promoted(&self, event: &EventAttributes, user_id: UserId) -> Notification {
        self.build(
            event,
            user_id,
            NotificationKind::AdminPromoted,
            format!("You're registered for {}", event.title),
            format!("An organizer has registered you for {}.", event.title),
        )
    }

    fn build(
        &self,
        event: &EventAttributes,
        user_id: UserId,
        kind: NotificationKind,
        title: String,
        body: String,
    ) -> Notification {
        Notification::new(user_id, kind, title, body)
            .with_action_url(self.event_url(event))
            .with_metadata("event_id", event.id.to_string())
            .with_metadata("event_slug", event.slug.clone())
    }
}

impl Default for NotificationTemplates {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
