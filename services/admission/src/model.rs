//! Domain model: events as seen by the admission core, and registrations.
//!
//! Optional columns are modelled as sum types so the unbound and absent cases
//! are matched explicitly:
//! - [`Capacity`] (`Unlimited` | `Limited(n)`)
//! - [`Fee`] (`Free` | `Paid { cents }`)
//! - [`Placement`] (`Registered` | `Waitlisted(order)` | `NotAttending`), which
//!   makes "a waitlist order exists iff the record is waitlisted" structural.

use chrono::{DateTime, Utc};
use rsvp_id::{EventId, RegistrationId, UserId};
use serde::{Deserialize, Serialize};

pub use rsvp_reconcile::{Capacity, WaitlistOrder};

use crate::error::ValidationError;

// =============================================================================
// Event attributes
// =============================================================================

/// Registration fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fee {
    Free,
    Paid { cents: u32 },
}

impl Fee {
    /// Builds a fee from a nullable column; zero or absent means free.
    pub fn from_cents(cents: Option<u32>) -> Self {
        match cents {
            Some(cents) if cents > 0 => Self::Paid { cents },
            _ => Self::Free,
        }
    }

    pub fn cents(&self) -> Option<u32> {
        match self {
            Self::Free => None,
            Self::Paid { cents } => Some(*cents),
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }
}

/// Member-facing registration window. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationWindow {
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
}

impl RegistrationWindow {
    pub fn always_open() -> Self {
        Self::default()
    }

    /// Checks that `now` lies inside the window (bounds inclusive).
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if let Some(opens_at) = self.opens_at {
            if now < opens_at {
                return Err(ValidationError::NotYetOpen { opens_at });
            }
        }
        if let Some(closes_at) = self.closes_at {
            if now > closes_at {
                return Err(ValidationError::Closed { closes_at });
            }
        }
        Ok(())
    }
}

/// Read-only view of an event's admission attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttributes {
    pub id: EventId,
    pub title: String,
    pub slug: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: Capacity,
    pub registration_enabled: bool,
    pub window: RegistrationWindow,
    pub waitlist_enabled: bool,
    pub fee: Fee,
}

impl EventAttributes {
    /// A free, always-open event with the given capacity and no waitlist.
    pub fn new(title: impl Into<String>, slug: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            slug: slug.into(),
            starts_at: None,
            capacity,
            registration_enabled: true,
            window: RegistrationWindow::always_open(),
            waitlist_enabled: false,
            fee: Fee::Free,
        }
    }

    pub fn with_waitlist(mut self, enabled: bool) -> Self {
        self.waitlist_enabled = enabled;
        self
    }

    pub fn with_fee(mut self, fee: Fee) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_window(mut self, window: RegistrationWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_registration_enabled(mut self, enabled: bool) -> Self {
        self.registration_enabled = enabled;
        self
    }

    /// Member-facing gate: registration must be enabled and `now` inside the
    /// window. Administrative paths skip this.
    pub fn check_member_access(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if !self.registration_enabled {
            return Err(ValidationError::RegistrationDisabled);
        }
        self.window.check(now)
    }
}

// =============================================================================
// Registrations
// =============================================================================

/// Member intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Yes,
    No,
}

/// Flat registration status, as stored and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    Waitlisted,
    NotAttending,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Waitlisted => "waitlisted",
            Self::NotAttending => "not_attending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "waitlisted" => Some(Self::Waitlisted),
            "not_attending" => Some(Self::NotAttending),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who moved a record off the waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionSource {
    Auto,
    Admin,
}

impl PromotionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Where a registration currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Registered,
    Waitlisted(WaitlistOrder),
    NotAttending,
}

impl Placement {
    pub fn status(&self) -> RegistrationStatus {
        match self {
            Self::Registered => RegistrationStatus::Registered,
            Self::Waitlisted(_) => RegistrationStatus::Waitlisted,
            Self::NotAttending => RegistrationStatus::NotAttending,
        }
    }

    pub fn waitlist_order(&self) -> Option<WaitlistOrder> {
        match self {
            Self::Waitlisted(order) => Some(*order),
            _ => None,
        }
    }

    /// Rebuilds a placement from its stored columns.
    ///
    /// Returns `None` when the columns disagree (an order without a
    /// waitlisted status, or the reverse).
    pub fn from_parts(status: RegistrationStatus, order: Option<WaitlistOrder>) -> Option<Self> {
        match (status, order) {
            (RegistrationStatus::Registered, None) => Some(Self::Registered),
            (RegistrationStatus::Waitlisted, Some(order)) => Some(Self::Waitlisted(order)),
            (RegistrationStatus::NotAttending, None) => Some(Self::NotAttending),
            _ => None,
        }
    }
}

/// One user's registration for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: RegistrationId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub placement: Placement,
    pub promoted_at: Option<DateTime<Utc>>,
    pub promotion_source: Option<PromotionSource>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(event_id: EventId, user_id: UserId, placement: Placement, now: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::new(),
            event_id,
            user_id,
            placement,
            promoted_at: None,
            promotion_source: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        self.placement.status()
    }

    pub fn waitlist_order(&self) -> Option<WaitlistOrder> {
        self.placement.waitlist_order()
    }

    pub fn is_registered(&self) -> bool {
        self.placement == Placement::Registered
    }

    /// Moves the record to `placement`, stamping `updated_at`.
    ///
    /// Promotion metadata describes how the current seat was obtained, so it
    /// survives only while the record keeps that seat.
    pub fn place(&mut self, placement: Placement, now: DateTime<Utc>) {
        let keeps_seat = self.is_registered() && placement == Placement::Registered;
        if !keeps_seat {
            self.promoted_at = None;
            self.promotion_source = None;
        }
        self.placement = placement;
        self.updated_at = now;
    }

    /// Moves the record into a registered seat as a promotion.
    pub fn promote(&mut self, source: PromotionSource, now: DateTime<Utc>) {
        self.place(Placement::Registered, now);
        self.promoted_at = Some(now);
        self.promotion_source = Some(source);
    }

    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            status: self.status(),
            waitlist_order: self.waitlist_order(),
            promotion_source: self.promotion_source,
            status_reason: self.status_reason.clone(),
        }
    }
}

/// Serializable before/after view used in audit records and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_order: Option<WaitlistOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_source: Option<PromotionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    #[rstest]
    #[case(None, Fee::Free)]
    #[case(Some(0), Fee::Free)]
    #[case(Some(500), Fee::Paid { cents: 500 })]
    fn test_fee_from_cents(#[case] cents: Option<u32>, #[case] expected: Fee) {
        assert_eq!(Fee::from_cents(cents), expected);
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        let window = RegistrationWindow {
            opens_at: Some(now - Duration::hours(1)),
            closes_at: Some(now + Duration::hours(1)),
        };
        assert!(window.check(now).is_ok());
        assert!(matches!(
            window.check(now - Duration::hours(2)),
            Err(ValidationError::NotYetOpen { .. })
        ));
        assert!(matches!(
            window.check(now + Duration::hours(2)),
            Err(ValidationError::Closed { .. })
        ));
        assert!(RegistrationWindow::always_open().check(now).is_ok());
    }

    #[test]
    fn test_member_access_requires_enabled() {
        let event = EventAttributes::new("Meetup", "meetup", Capacity::Unlimited)
            .with_registration_enabled(false);
        assert_eq!(
            event.check_member_access(Utc::now()),
            Err(ValidationError::RegistrationDisabled)
        );
    }

    #[rstest]
    #[case(RegistrationStatus::Registered, None, true)]
    #[case(RegistrationStatus::Registered, Some(1), false)]
    #[case(RegistrationStatus::Waitlisted, Some(3), true)]
    #[case(RegistrationStatus::Waitlisted, None, false)]
    #[case(RegistrationStatus::NotAttending, None, true)]
    #[case(RegistrationStatus::NotAttending, Some(2), false)]
    fn test_placement_from_parts(
        #[case] status: RegistrationStatus,
        #[case] order: Option<i64>,
        #[case] valid: bool,
    ) {
        let placement = Placement::from_parts(status, order.map(WaitlistOrder::new));
        assert_eq!(placement.is_some(), valid);
        if let Some(placement) = placement {
            assert_eq!(placement.status(), status);
        }
    }

    #[test]
    fn test_promote_clears_order() {
        let now = Utc::now();
        let mut reg = Registration::new(
            EventId::new(),
            UserId::new(),
            Placement::Waitlisted(WaitlistOrder::new(4)),
            now,
        );
        reg.promote(PromotionSource::Auto, now + Duration::seconds(1));
        assert!(reg.is_registered());
        assert_eq!(reg.waitlist_order(), None);
        assert_eq!(reg.promotion_source, Some(PromotionSource::Auto));
        assert_eq!(reg.promoted_at, Some(now + Duration::seconds(1)));
    }

    #[test]
    fn test_leaving_a_seat_clears_promotion() {
        let now = Utc::now();
        let mut reg = Registration::new(
            EventId::new(),
            UserId::new(),
            Placement::Waitlisted(WaitlistOrder::new(1)),
            now,
        );
        reg.promote(PromotionSource::Auto, now);

        reg.place(Placement::Registered, now + Duration::seconds(1));
        assert_eq!(reg.promotion_source, Some(PromotionSource::Auto));

        reg.place(Placement::NotAttending, now + Duration::seconds(2));
        assert_eq!(reg.promotion_source, None);
        assert_eq!(reg.promoted_at, None);

        reg.place(Placement::Registered, now + Duration::seconds(3));
        assert_eq!(reg.promotion_source, None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RegistrationStatus::Registered,
            RegistrationStatus::Waitlisted,
            RegistrationStatus::NotAttending,
        ] {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PromotionSource::parse("admin"), Some(PromotionSource::Admin));
        assert_eq!(RegistrationStatus::parse("REGISTERED"), None);
    }
}
