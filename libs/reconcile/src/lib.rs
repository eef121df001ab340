//! Reconciliation primitives for capacity-limited admission.
//!
//! This library holds the pure half of the reconciliation engine: given an
//! event's capacity, the number of registered seats, and the current waitlist,
//! it decides who should be promoted. It never touches storage. Key concepts:
//!
//! - **Capacity**: optional upper bound on registered seats.
//! - **Slots**: how many more registrations capacity allows right now.
//! - **Waitlist order**: per-event monotonically increasing position.
//!
//! # Invariants
//!
//! - Plans never promote more candidates than there are free slots
//! - Candidates are promoted strictly by (order, created_at)
//! - Planning is deterministic and idempotent: re-planning after applying a
//!   plan yields an empty plan

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger invariant violations detected by [`check_ledger`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// More seats registered than capacity allows.
    #[error("oversold: {registered} registered against capacity {capacity}")]
    Oversold { capacity: u32, registered: u32 },

    /// Two waitlisted records share a position.
    #[error("duplicate waitlist order {0}")]
    DuplicateOrder(i64),

    /// A waitlist order is at or below zero.
    #[error("waitlist order must be positive, got {0}")]
    NonPositiveOrder(i64),

    /// A waitlist order sits above the recorded high-water mark.
    #[error("waitlist order {order} exceeds high-water mark {high_water}")]
    AboveHighWater { order: i64, high_water: i64 },
}

// =============================================================================
// Capacity
// =============================================================================

/// Upper bound on simultaneously registered records for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Capacity {
    /// No bound; every request is admitted.
    Unlimited,
    /// At most this many registered records.
    Limited(u32),
}

impl Capacity {
    /// Builds a capacity from a nullable column value.
    pub fn from_limit(limit: Option<u32>) -> Self {
        match limit {
            Some(limit) => Self::Limited(limit),
            None => Self::Unlimited,
        }
    }

    /// The nullable column form of this capacity.
    pub fn limit(&self) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(limit) => Some(*limit),
        }
    }

    /// Free slots given the current registered count.
    pub fn slots(&self, registered: u32) -> Slots {
        match self {
            Self::Unlimited => Slots::Unbounded,
            Self::Limited(limit) => Slots::Available(limit.saturating_sub(registered)),
        }
    }

    /// Returns true if one more registration fits.
    pub fn admits_one_more(&self, registered: u32) -> bool {
        self.slots(registered).has_room()
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Limited(limit) => write!(f, "{limit}"),
        }
    }
}

/// Free registration slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slots {
    /// Capacity is unbound.
    Unbounded,
    /// This many slots are free; zero when full or over capacity.
    Available(u32),
}

impl Slots {
    /// Returns true if at least one slot is free.
    pub fn has_room(&self) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Available(n) => *n > 0,
        }
    }

    /// How many of `wanted` can be admitted.
    pub fn take(&self, wanted: usize) -> usize {
        match self {
            Self::Unbounded => wanted,
            Self::Available(n) => wanted.min(*n as usize),
        }
    }
}

// =============================================================================
// Waitlist ordering
// =============================================================================

/// Position on an event's waitlist. Lower is earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitlistOrder(i64);

impl WaitlistOrder {
    /// The first position issued for an event.
    pub const FIRST: Self = Self(1);

    /// Wraps a stored value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// The next position after this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for WaitlistOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The position to issue after `high_water`, the largest order ever issued for
/// the event (or `None` if nothing has been issued yet).
pub fn next_waitlist_order(high_water: Option<WaitlistOrder>) -> WaitlistOrder {
    high_water.map_or(WaitlistOrder::FIRST, |order| order.next())
}

/// A waitlisted record as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistCandidate<K> {
    /// Caller-defined key, typically the user id.
    pub key: K,
    /// Waitlist position.
    pub order: WaitlistOrder,
    /// When the record was created; breaks ties between equal orders.
    pub created_at: DateTime<Utc>,
}

/// Sort candidates into promotion order: (order asc, created_at asc).
pub fn sort_fifo<K>(candidates: &mut [WaitlistCandidate<K>]) {
    candidates.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// Choose which waitlisted candidates to promote.
///
/// Returns keys in promotion order. With unbound capacity every candidate is
/// promoted; otherwise at most `capacity - registered` are, lowest order first.
pub fn plan_promotions<K: Clone>(
    capacity: Capacity,
    registered: u32,
    waitlist: &[WaitlistCandidate<K>],
) -> Vec<K> {
    let take = capacity.slots(registered).take(waitlist.len());
    if take == 0 {
        return Vec::new();
    }

    let mut ordered = waitlist.to_vec();
    sort_fifo(&mut ordered);
    ordered.into_iter().take(take).map(|c| c.key).collect()
}

// =============================================================================
// Convergence
// =============================================================================

/// How far an event's ledger is from its reconciled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Nothing left to promote.
    Converged,
    /// This many waitlisted records could be promoted right now.
    PendingPromotions(u32),
    /// Registered count exceeds capacity by this much.
    Oversubscribed(u32),
}

impl ConvergenceStatus {
    /// Returns true if no promotion is pending and capacity holds.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Classify an event's ledger.
pub fn assess(capacity: Capacity, registered: u32, waitlisted: u32) -> ConvergenceStatus {
    if let Capacity::Limited(limit) = capacity {
        if registered > limit {
            return ConvergenceStatus::Oversubscribed(registered - limit);
        }
    }

    let pending = capacity.slots(registered).take(waitlisted as usize) as u32;
    if pending == 0 {
        ConvergenceStatus::Converged
    } else {
        ConvergenceStatus::PendingPromotions(pending)
    }
}

/// Verify the capacity and waitlist-ordering invariants of one event.
///
/// `waitlist_orders` are the orders of currently waitlisted records and
/// `high_water` the largest order ever issued for the event.
pub fn check_ledger(
    capacity: Capacity,
    registered: u32,
    waitlist_orders: &[WaitlistOrder],
    high_water: Option<WaitlistOrder>,
) -> Result<(), ReconcileError> {
    if let Capacity::Limited(limit) = capacity {
        if registered > limit {
            return Err(ReconcileError::Oversold {
                capacity: limit,
                registered,
            });
        }
    }

    let mut seen = HashSet::with_capacity(waitlist_orders.len());
    for order in waitlist_orders {
        if order.value() <= 0 {
            return Err(ReconcileError::NonPositiveOrder(order.value()));
        }
        if let Some(high_water) = high_water {
            if *order > high_water {
                return Err(ReconcileError::AboveHighWater {
                    order: order.value(),
                    high_water: high_water.value(),
                });
            }
        }
        if !seen.insert(*order) {
            return Err(ReconcileError::DuplicateOrder(order.value()));
        }
    }

    Ok(())
}
