//! # rsvp-events
//!
//! Records that leave the admission core: audit entries and notifications.
//!
//! ## Design Principles
//!
//! - Audit records are written in the same transaction as the state change
//!   they describe, so they carry full before/after snapshots
//! - Notifications are built during a unit of work but only dispatched after
//!   commit; they are plain data with no delivery handle attached
//! - Both are serializable as JSON for storage and transport
//!
//! ## Audit Records
//!
//! Every audit record names:
//! - who acted (`actor_type`, `actor_user_id`)
//! - what happened (`action_type`, see [`action_types`])
//! - on what (`entity_type`, `entity_id`, `event_id`, `target_user_id`)
//! - the change itself (`before`, `after`, `summary`, `metadata`)

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
