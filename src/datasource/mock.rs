//! Mock leg source for testing without network calls.

use super::{LegPage, LegSource, LegSourceError, PageRequest, SourceWarnings};
use crate::domain::{sort_legs_newest_first, Decimal, TransactionLeg};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock leg source that serves predefined legs, newest first, in pages.
///
/// Cursors are stringified offsets. Clones share their call counters and
/// failure budget, so a test can keep a handle after passing one to a cache.
#[derive(Debug, Clone)]
pub struct MockLegSource {
    legs: Vec<TransactionLeg>,
    gas_usd_by_tx: HashMap<String, Decimal>,
    warnings: SourceWarnings,
    use_cursors: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    failures_remaining: Arc<AtomicUsize>,
}

impl MockLegSource {
    pub fn new() -> Self {
        Self {
            legs: Vec::new(),
            gas_usd_by_tx: HashMap::new(),
            warnings: SourceWarnings::new(),
            use_cursors: true,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            failures_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_leg(mut self, leg: TransactionLeg) -> Self {
        self.legs.push(leg);
        self
    }

    pub fn with_legs(mut self, legs: Vec<TransactionLeg>) -> Self {
        self.legs.extend(legs);
        self
    }

    pub fn with_gas(mut self, transaction_hash: &str, usd: Decimal) -> Self {
        self.gas_usd_by_tx
            .insert(transaction_hash.to_ascii_lowercase(), usd);
        self
    }

    pub fn with_warnings(mut self, warnings: SourceWarnings) -> Self {
        self.warnings = warnings;
        self
    }

    /// Paginate by page number only and leave `next_cursor` empty.
    pub fn without_cursors(mut self) -> Self {
        self.use_cursors = false;
        self
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` requests with a network error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of `fetch_page` calls seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn matching_legs(&self, request: &PageRequest) -> Vec<TransactionLeg> {
        let mut legs: Vec<TransactionLeg> = self
            .legs
            .iter()
            .filter(|leg| {
                leg.wallet_address == request.address
                    && (request.networks.is_empty() || request.networks.contains(&leg.network))
                    && request.from.map_or(true, |from| leg.timestamp >= from)
                    && request.to.map_or(true, |to| leg.timestamp <= to)
            })
            .cloned()
            .collect();
        sort_legs_newest_first(&mut legs);
        legs
    }
}

impl Default for MockLegSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LegSource for MockLegSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<LegPage, LegSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(LegSourceError::NetworkError("injected failure".to_string()));
        }

        let legs = self.matching_legs(request);
        let limit = request.limit.max(1) as usize;
        let offset = match (&request.cursor, self.use_cursors) {
            (Some(cursor), true) => cursor.parse::<usize>().map_err(|_| {
                LegSourceError::HttpError {
                    status: 400,
                    message: format!("Malformed cursor {}", cursor),
                }
            })?,
            _ => (request.page.max(1) as usize - 1) * limit,
        };

        let end = (offset + limit).min(legs.len());
        let slice = if offset < legs.len() {
            legs[offset..end].to_vec()
        } else {
            Vec::new()
        };
        let has_next = end < legs.len();
        let next_cursor = (self.use_cursors && has_next).then(|| end.to_string());

        let gas_usd_by_tx = slice
            .iter()
            .filter_map(|leg| {
                self.gas_usd_by_tx
                    .get(&leg.transaction_hash)
                    .map(|usd| (leg.transaction_hash.clone(), *usd))
            })
            .collect();

        Ok(LegPage {
            legs: slice,
            gas_usd_by_tx,
            page: request.page,
            limit: request.limit,
            next_cursor,
            has_next,
            warnings: self.warnings.clone(),
        })
    }
}
