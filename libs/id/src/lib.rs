//! # rsvp-id
//!
//! Stable ID types, parsing, and validation for the rsvp admission service.
//!
//! ## Design Principles
//!
//! - IDs are stable and system-generated; titles and slugs are labels
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed so an event id can never be passed where a user id is expected
//!
//! ## ID Format
//!
//! All IDs use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `evt_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `usr_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `reg_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! The ULID half keeps IDs sortable by creation time, which the ledger relies
//! on only as a last-resort tiebreak.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
