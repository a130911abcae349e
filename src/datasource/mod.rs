//! Leg source abstraction: paginated transaction legs for a wallet address.

use crate::domain::{Address, Decimal, Network, TimeMs, TransactionLeg};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpLegSource;
pub use mock::MockLegSource;

/// Source of normalized transaction legs.
///
/// Implementations must handle transport retry/backoff; the caller owns
/// pagination state and decides which page to ask for next.
#[async_trait]
pub trait LegSource: Send + Sync + fmt::Debug {
    /// Fetch one page of legs for a single wallet.
    ///
    /// # Returns
    /// Legs ordered newest first, plus the pagination state needed to ask for
    /// the following page.
    async fn fetch_page(&self, request: &PageRequest) -> Result<LegPage, LegSourceError>;
}

/// One request against the leg source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub address: Address,
    pub networks: Vec<Network>,
    pub from: Option<TimeMs>,
    pub to: Option<TimeMs>,
    /// 1-based page number, used when the source does not hand out cursors.
    pub page: u32,
    pub limit: u32,
    pub cursor: Option<String>,
    pub min_usd: Option<Decimal>,
    pub spam_filter: bool,
    /// Backend class filter, forwarded verbatim.
    pub class: Option<String>,
}

impl PageRequest {
    pub fn first(address: Address, limit: u32) -> Self {
        Self {
            address,
            networks: Vec::new(),
            from: None,
            to: None,
            page: 1,
            limit,
            cursor: None,
            min_usd: None,
            spam_filter: true,
            class: None,
        }
    }
}

/// Backpressure flags reported alongside a page. Non-fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceWarnings(BTreeMap<String, bool>);

impl SourceWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, name: &str, raised: bool) -> Self {
        self.0.insert(name.to_string(), raised);
        self
    }

    /// True when any provider reported rate limiting.
    pub fn rate_limited(&self) -> bool {
        self.0.values().any(|raised| *raised)
    }

    /// Names of the raised flags, sorted.
    pub fn raised(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, raised)| **raised)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Flags are sticky: once raised for a context they stay raised.
    pub fn merge(&mut self, other: &SourceWarnings) {
        for (name, raised) in &other.0 {
            let entry = self.0.entry(name.clone()).or_insert(false);
            *entry |= *raised;
        }
    }
}

/// One page of legs as returned by the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegPage {
    pub legs: Vec<TransactionLeg>,
    /// Gas cost in USD keyed by transaction hash.
    pub gas_usd_by_tx: HashMap<String, Decimal>,
    pub page: u32,
    pub limit: u32,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub warnings: SourceWarnings,
}

/// Error type for leg source operations.
///
/// `Clone` so a single failed fetch can be reported to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 404, 5xx after retries)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded and retries exhausted
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for LegSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LegSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            LegSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LegSourceError::RateLimited => write!(f, "Rate limited"),
            LegSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for LegSourceError {}
