//! Domain types and determinism layer for the portfolio ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, Address, Network, Direction, Classification
//! - TransactionLeg and Asset types with a stable dedup identity
//! - Stable leg ordering helpers for deterministic processing

pub mod decimal;
pub mod leg;
pub mod ordering;
pub mod primitives;

pub use decimal::Decimal;
pub use leg::{Asset, AssetKey, LegFee, TransactionLeg};
pub use ordering::{
    cmp_chronological, cmp_newest_first, sort_legs_chronological, sort_legs_newest_first,
    LegOrderingKey,
};
pub use primitives::{Address, Classification, Direction, Network, TimeMs, MS_PER_DAY};
