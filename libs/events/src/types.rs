//! Notification and action type definitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rsvp_id::{NotificationId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Action Type Constants
// =============================================================================

/// Audit action type names.
pub mod action_types {
    pub const REGISTRATION_ADMIN_OVERRIDE: &str = "registration.admin_override";
    pub const WAITLIST_RESEQUENCED: &str = "waitlist.resequenced";
}

// =============================================================================
// Notifications
// =============================================================================

/// What a notification tells the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The user's own request ended in a registered seat.
    RegistrationConfirmed,
    /// Reconciliation moved the user off the waitlist.
    WaitlistPromoted,
    /// An administrator moved the user into a registered seat.
    AdminPromoted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmed => "registration_confirmed",
            Self::WaitlistPromoted => "waitlist_promoted",
            Self::AdminPromoted => "admin_promoted",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
}

/// A notification ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// A notification on the default channels (in-app and email).
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            kind,
            title: title.into(),
            body: body.into(),
            action_url: None,
            channels: vec![Channel::InApp, Channel::Email],
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
