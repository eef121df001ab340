//! Audit record envelope.

use chrono::{DateTime, Utc};
use rsvp_id::{AuditLogId, EventId, RequestId, UserId};
use serde::{Deserialize, Serialize};

use crate::EventError;

/// Actor type for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A member acting on their own registration.
    User,
    /// An administrator acting on someone else's registration.
    Admin,
    /// The service itself (reconciliation).
    #[default]
    System,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::Admin => write!(f, "admin"),
            ActorType::System => write!(f, "system"),
        }
    }
}

/// Kind of entity an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A single (event, user) registration.
    #[default]
    Registration,
    /// An event's waitlist as a whole.
    Waitlist,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Registration => write!(f, "registration"),
            EntityType::Waitlist => write!(f, "waitlist"),
        }
    }
}

/// An audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id.
    pub id: AuditLogId,

    /// When the audited change happened.
    pub occurred_at: DateTime<Utc>,

    /// Type of actor that made the change.
    pub actor_type: ActorType,

    /// The acting user.
    pub actor_user_id: UserId,

    /// What happened (see [`crate::action_types`]).
    pub action_type: String,

    /// Kind of entity changed.
    pub entity_type: EntityType,

    /// Identifier of the changed entity.
    pub entity_id: String,

    /// Event the change belongs to.
    pub event_id: EventId,

    /// User whose registration changed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,

    /// One-line human summary.
    pub summary: String,

    /// Snapshot before the change.
    pub before: serde_json::Value,

    /// Snapshot after the change.
    pub after: serde_json::Value,

    /// Free-form extra context (reason, request id, ...).
    pub metadata: serde_json::Value,

    /// Request correlation ID for tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl AuditRecord {
    /// Creates a new audit record builder.
    pub fn builder() -> AuditRecordBuilder {
        AuditRecordBuilder::new()
    }
}

/// Builder for [`AuditRecord`].
#[derive(Debug, Default)]
pub struct AuditRecordBuilder {
    occurred_at: Option<DateTime<Utc>>,
    actor: Option<(ActorType, UserId)>,
    action_type: Option<String>,
    entity: Option<(EntityType, String)>,
    event_id: Option<EventId>,
    target_user_id: Option<UserId>,
    summary: Option<String>,
    before: serde_json::Value,
    after: serde_json::Value,
    metadata: serde_json::Value,
    request_id: Option<RequestId>,
}

impl AuditRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn actor(mut self, actor_type: ActorType, actor_user_id: UserId) -> Self {
        self.actor = Some((actor_type, actor_user_id));
        self
    }

    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    pub fn entity(mut self, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        self.entity = Some((entity_type, entity_id.into()));
        self
    }

    pub fn event_id(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn target_user_id(mut self, user_id: UserId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the before/after snapshots from anything serializable.
    pub fn change<B: Serialize, A: Serialize>(
        mut self,
        before: &B,
        after: &A,
    ) -> Result<Self, EventError> {
        self.before = serde_json::to_value(before)?;
        self.after = serde_json::to_value(after)?;
        Ok(self)
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn request_id(mut self, request_id: Option<RequestId>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Builds the audit record.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingField`] if actor, action, entity, event or
    /// summary were never set.
    pub fn build(self) -> Result<AuditRecord, EventError> {
        let (actor_type, actor_user_id) = self.actor.ok_or(EventError::MissingField("actor"))?;
        let (entity_type, entity_id) = self.entity.ok_or(EventError::MissingField("entity"))?;

        Ok(AuditRecord {
            id: AuditLogId::new(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            actor_type,
            actor_user_id,
            action_type: self
                .action_type
                .ok_or(EventError::MissingField("action_type"))?,
            entity_type,
            entity_id,
            event_id: self.event_id.ok_or(EventError::MissingField("event_id"))?,
            target_user_id: self.target_user_id,
            summary: self.summary.ok_or(EventError::MissingField("summary"))?,
            before: self.before,
            after: self.after,
            metadata: self.metadata,
            request_id: self.request_id,
        })
    }
}
