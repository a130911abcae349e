//! Load contexts: the (wallet set, network set, date range) a cache entry belongs to.

use crate::domain::{Address, Network, TimeMs};
use serde::{Deserialize, Serialize};

/// Inclusive date-range boundaries; `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<TimeMs>,
    pub to: Option<TimeMs>,
}

impl DateRange {
    pub fn new(from: Option<TimeMs>, to: Option<TimeMs>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Normalized description of what a load covers.
///
/// Wallets and networks are lowercased, sorted and deduplicated on
/// construction, so two contexts built from the same sets in a different
/// order are equal and share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadContext {
    wallets: Vec<Address>,
    networks: Vec<Network>,
    range: DateRange,
}

impl LoadContext {
    pub fn new(wallets: Vec<Address>, networks: Vec<Network>, range: DateRange) -> Self {
        let mut wallets = wallets;
        wallets.sort();
        wallets.dedup();
        let mut networks = networks;
        networks.sort();
        networks.dedup();
        Self {
            wallets,
            networks,
            range,
        }
    }

    pub fn for_wallet(wallet: Address) -> Self {
        Self::new(vec![wallet], Vec::new(), DateRange::unbounded())
    }

    pub fn wallets(&self) -> &[Address] {
        &self.wallets
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Stable string form, used as the cache key.
    pub fn key(&self) -> ContextKey {
        let wallets: Vec<&str> = self.wallets.iter().map(Address::as_str).collect();
        let networks: Vec<&str> = self.networks.iter().map(Network::as_str).collect();
        let bound = |t: Option<TimeMs>| t.map(|t| t.as_ms().to_string()).unwrap_or_default();
        ContextKey(format!(
            "{}|{}|{}|{}",
            wallets.join(","),
            networks.join(","),
            bound(self.range.from),
            bound(self.range.to)
        ))
    }

    /// True when any wallet of this context starts with `prefix` (case-insensitive).
    pub fn matches_address_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_ascii_lowercase();
        self.wallets.iter().any(|w| w.as_str().starts_with(&prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let a = LoadContext::new(
            vec![Address::new("0xBB"), Address::new("0xaa")],
            vec![Network::new("base"), Network::new("Ethereum")],
            DateRange::new(Some(TimeMs::new(1)), None),
        );
        let b = LoadContext::new(
            vec![Address::new("0xaa"), Address::new("0xbb"), Address::new("0xAA")],
            vec![Network::new("ethereum"), Network::new("base")],
            DateRange::new(Some(TimeMs::new(1)), None),
        );
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "0xaa,0xbb|base,ethereum|1|");
    }

    #[test]
    fn test_range_changes_key() {
        let a = LoadContext::for_wallet(Address::new("0x1"));
        let b = LoadContext::new(
            vec![Address::new("0x1")],
            Vec::new(),
            DateRange::new(None, Some(TimeMs::new(5))),
        );
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_prefix_match() {
        let ctx = LoadContext::new(
            vec![Address::new("0xabc123"), Address::new("0xdef")],
            Vec::new(),
            DateRange::unbounded(),
        );
        assert!(ctx.matches_address_prefix("0xABC"));
        assert!(ctx.matches_address_prefix("0xdef"));
        assert!(!ctx.matches_address_prefix("0x999"));
    }
}
