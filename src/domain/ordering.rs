//! Stable leg ordering for deterministic processing.

use crate::domain::{Direction, TransactionLeg};
use std::cmp::Ordering;

/// Stable ordering key for legs.
///
/// Ordering: timestamp -> direction (in before out) -> transaction hash -> leg id.
///
/// Receipts sort ahead of sends at the same instant, so an asset received and
/// forwarded in one transaction is acquired before it is disposed of.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LegOrderingKey<'a> {
    pub timestamp: i64,
    pub direction: Direction,
    pub transaction_hash: &'a str,
    pub id: &'a str,
}

impl<'a> LegOrderingKey<'a> {
    pub fn from_leg(leg: &'a TransactionLeg) -> Self {
        LegOrderingKey {
            timestamp: leg.timestamp.as_ms(),
            direction: leg.direction,
            transaction_hash: &leg.transaction_hash,
            id: &leg.id,
        }
    }
}

/// Oldest first; the order the cost-basis engine consumes legs in.
pub fn cmp_chronological(a: &TransactionLeg, b: &TransactionLeg) -> Ordering {
    LegOrderingKey::from_leg(a).cmp(&LegOrderingKey::from_leg(b))
}

/// Newest first; the order legs are displayed in.
///
/// Ties on timestamp still break on direction, hash and id so the two orders
/// agree on everything except time.
pub fn cmp_newest_first(a: &TransactionLeg, b: &TransactionLeg) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.direction.cmp(&b.direction))
        .then_with(|| a.transaction_hash.cmp(&b.transaction_hash))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_legs_chronological(legs: &mut [TransactionLeg]) {
    legs.sort_by(cmp_chronological);
}

pub fn sort_legs_newest_first(legs: &mut [TransactionLeg]) {
    legs.sort_by(cmp_newest_first);
}
