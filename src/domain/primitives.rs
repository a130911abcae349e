//! Domain primitives: TimeMs, Address, Network, Direction, Classification.

use serde::{Deserialize, Serialize};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Whole days elapsed from `earlier` to `self`, rounded toward negative infinity.
    pub fn days_since(&self, earlier: TimeMs) -> i64 {
        (self.0 - earlier.0).div_euclid(MS_PER_DAY)
    }

    pub fn plus_days(&self, days: i64) -> TimeMs {
        TimeMs(self.0 + days * MS_PER_DAY)
    }
}

/// Wallet address, always stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl AsRef<str>) -> Self {
        Address(addr.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain identifier (e.g. "ethereum", "base").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Network(String);

impl Network {
    pub fn new(network: impl AsRef<str>) -> Self {
        Network(network.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way value moved relative to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// UI bucket a leg is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Income,
    Expense,
    Swap,
    Gas,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Income,
        Classification::Expense,
        Classification::Swap,
        Classification::Gas,
    ];

    /// Derive the bucket from the backend's finer class tag plus direction.
    ///
    /// Tags pick out swaps and gas whichever way the leg moves. Everything
    /// else follows the direction: a received payment is income, a sent
    /// reward is an expense.
    pub fn from_tag(tag: Option<&str>, direction: Direction) -> Self {
        let tag = tag.map(|t| t.trim().to_ascii_lowercase()).unwrap_or_default();
        let has = |needles: &[&str]| needles.iter().any(|n| tag.contains(n));

        if has(&["swap", "trade", "dex"]) {
            Classification::Swap
        } else if has(&["gas", "fee"]) {
            Classification::Gas
        } else {
            match direction {
                Direction::In => Classification::Income,
                Direction::Out => Classification::Expense,
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Income => "income",
            Classification::Expense => "expense",
            Classification::Swap => "swap",
            Classification::Gas => "gas",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Some(Classification::Income),
            "expense" => Some(Classification::Expense),
            "swap" => Some(Classification::Swap),
            "gas" => Some(Classification::Gas),
            _ => None,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
