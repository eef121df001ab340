//! Notification dispatch.
//!
//! Admission work never sends notifications inline. A unit of work fills a
//! [`PostCommit`] outbox; the outbox is handed to a dispatcher only after the
//! unit commits, and each failed send is logged and dropped.

mod templates;

pub use templates::NotificationTemplates;

use std::sync::Arc;

use async_trait::async_trait;
use rsvp_events::Notification;
use thiserror::Error;
use tracing::{info, warn};

/// Notification delivery failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable notification sink.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_notification(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Dispatcher that emits each notification as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn send_notification(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            title = %notification.title,
            action_url = notification.action_url.as_deref().unwrap_or(""),
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Notifications collected during a unit of work, sent after it commits.
#[derive(Debug, Default)]
#[must_use = "a post-commit outbox does nothing until dispatched"]
pub struct PostCommit {
    pending: Vec<Notification>,
}

impl PostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    pub fn extend(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.pending.extend(notifications);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sends every pending notification in order. Failures are logged and
    /// swallowed; the number delivered is returned.
    pub async fn dispatch(self, dispatcher: &Arc<dyn NotificationDispatcher>) -> usize {
        let mut delivered = 0;
        for notification in &self.pending {
            match dispatcher.send_notification(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    error = %e,
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    "Failed to send notification"
                ),
            }
        }
        delivered
    }
}
