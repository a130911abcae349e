//! Raw page cache: fetches rounds of legs per context, deduplicates and
//! accumulates them, and never re-fetches a round it already holds.

use super::context::{ContextKey, LoadContext};
use crate::datasource::{LegSource, LegSourceError, PageRequest, SourceWarnings};
use crate::domain::{
    sort_legs_chronological, sort_legs_newest_first, Address, Decimal, TransactionLeg,
};
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Per-request knobs forwarded to the leg source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: u32,
    pub min_usd: Option<Decimal>,
    pub spam_filter: bool,
    pub class: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            min_usd: None,
            spam_filter: true,
            class: None,
        }
    }
}

/// One round: a page from every wallet of the context that still had data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub index: usize,
    /// Legs returned in this round, newest first, duplicates included.
    pub legs: Arc<Vec<TransactionLeg>>,
    /// How many of them were new to the context.
    pub new_legs: usize,
    /// True while at least one wallet has more pages.
    pub has_next: bool,
}

/// Read-only view of everything a context has accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct RawSnapshot {
    /// Changes whenever the context is cleared and loaded again; 0 when never loaded.
    pub epoch: u64,
    /// Deduplicated legs in arrival order. Append-only.
    pub log: Arc<Vec<TransactionLeg>>,
    /// Deduplicated legs, newest first.
    pub legs: Arc<Vec<TransactionLeg>>,
    pub pages_fetched: usize,
    pub exhausted: bool,
    pub gas_usd_by_tx: HashMap<String, Decimal>,
    pub warnings: SourceWarnings,
}

impl RawSnapshot {
    /// Oldest first, the order the cost-basis engine requires.
    pub fn chronological_legs(&self) -> Vec<TransactionLeg> {
        let mut legs: Vec<TransactionLeg> = self.legs.as_ref().clone();
        sort_legs_chronological(&mut legs);
        legs
    }
}

#[derive(Debug, Clone)]
struct WalletCursor {
    next_page: u32,
    cursor: Option<String>,
    exhausted: bool,
}

impl Default for WalletCursor {
    fn default() -> Self {
        Self {
            next_page: 1,
            cursor: None,
            exhausted: false,
        }
    }
}

#[derive(Debug)]
struct ContextState {
    context: LoadContext,
    epoch: u64,
    pages: BTreeMap<usize, RawPage>,
    cursors: BTreeMap<Address, WalletCursor>,
    seen: HashSet<String>,
    log: Arc<Vec<TransactionLeg>>,
    sorted: Arc<Vec<TransactionLeg>>,
    gas_usd_by_tx: HashMap<String, Decimal>,
    warnings: SourceWarnings,
}

impl ContextState {
    fn new(context: LoadContext, epoch: u64) -> Self {
        Self {
            context,
            epoch,
            pages: BTreeMap::new(),
            cursors: BTreeMap::new(),
            seen: HashSet::new(),
            log: Arc::new(Vec::new()),
            sorted: Arc::new(Vec::new()),
            gas_usd_by_tx: HashMap::new(),
            warnings: SourceWarnings::new(),
        }
    }

    /// Merge a batch, dropping legs already seen. Returns how many were new.
    fn merge(&mut self, mut batch: Vec<TransactionLeg>) -> usize {
        sort_legs_newest_first(&mut batch);
        let fresh: Vec<TransactionLeg> = batch
            .into_iter()
            .filter(|leg| self.seen.insert(leg.id.clone()))
            .collect();
        if fresh.is_empty() {
            return 0;
        }

        let added = fresh.len();
        Arc::make_mut(&mut self.log).extend(fresh.iter().cloned());
        let sorted = Arc::make_mut(&mut self.sorted);
        sorted.extend(fresh);
        sort_legs_newest_first(sorted);
        added
    }

    fn exhausted(&self) -> bool {
        self.pages
            .values()
            .next_back()
            .map_or(false, |page| !page.has_next)
    }

    fn snapshot(&self) -> RawSnapshot {
        RawSnapshot {
            epoch: self.epoch,
            log: Arc::clone(&self.log),
            legs: Arc::clone(&self.sorted),
            pages_fetched: self.pages.len(),
            exhausted: self.exhausted(),
            gas_usd_by_tx: self.gas_usd_by_tx.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

type RoundFuture = Shared<BoxFuture<'static, Result<RawPage, LegSourceError>>>;

#[derive(Default)]
struct CacheState {
    contexts: HashMap<ContextKey, ContextState>,
    in_flight: HashMap<(ContextKey, usize), RoundFuture>,
    next_epoch: u64,
}

struct Inner {
    source: Arc<dyn LegSource>,
    options: FetchOptions,
    state: Mutex<CacheState>,
}

/// Process-wide raw cache. Cheap to clone; clones share state.
///
/// The mutex is never held across an await, so every mutation completes
/// before control returns to the runtime.
#[derive(Clone)]
pub struct RawPageCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RawPageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPageCache")
            .field("source", &self.inner.source)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl RawPageCache {
    pub fn new(source: Arc<dyn LegSource>, options: FetchOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                options,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure rounds `0..=index` are cached and return round `index`.
    ///
    /// Returns `Ok(None)` when the source ran out before `index`. Concurrent
    /// callers asking for the same round share one in-flight fetch.
    pub async fn ensure_raw_page(
        &self,
        context: &LoadContext,
        index: usize,
    ) -> Result<Option<RawPage>, LegSourceError> {
        let mut last = None;
        for i in 0..=index {
            let page = self.ensure_round(context, i).await?;
            let has_next = page.has_next;
            last = Some(page);
            if !has_next && i < index {
                return Ok(None);
            }
        }
        Ok(last)
    }

    async fn ensure_round(
        &self,
        context: &LoadContext,
        index: usize,
    ) -> Result<RawPage, LegSourceError> {
        let key = context.key();
        let round = {
            let mut state = self.state();
            if let Some(page) = state
                .contexts
                .get(&key)
                .and_then(|ctx| ctx.pages.get(&index))
            {
                return Ok(page.clone());
            }
            state
                .in_flight
                .entry((key, index))
                .or_insert_with(|| {
                    let cache = self.clone();
                    let context = context.clone();
                    async move { cache.fetch_round(context, index).await }
                        .boxed()
                        .shared()
                })
                .clone()
        };
        round.await
    }

    async fn fetch_round(self, context: LoadContext, index: usize) -> Result<RawPage, LegSourceError> {
        let key = context.key();
        let options = &self.inner.options;

        let (epoch, requests) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let epoch = match state.contexts.get(&key) {
                Some(ctx) => ctx.epoch,
                None => {
                    state.next_epoch += 1;
                    let epoch = state.next_epoch;
                    state
                        .contexts
                        .insert(key.clone(), ContextState::new(context.clone(), epoch));
                    epoch
                }
            };
            let ctx = state
                .contexts
                .get_mut(&key)
                .ok_or_else(|| LegSourceError::Other("context vanished".to_string()))?;

            if let Some(page) = ctx.pages.get(&index) {
                let page = page.clone();
                state.in_flight.remove(&(key, index));
                return Ok(page);
            }
            if ctx.pages.len() != index {
                state.in_flight.remove(&(key, index));
                return Err(LegSourceError::Other(format!(
                    "raw page {} requested before page {}",
                    index,
                    index.saturating_sub(1)
                )));
            }

            let mut requests = Vec::new();
            for wallet in context.wallets() {
                let cursor = ctx.cursors.entry(wallet.clone()).or_default();
                if cursor.exhausted {
                    continue;
                }
                requests.push(PageRequest {
                    address: wallet.clone(),
                    networks: context.networks().to_vec(),
                    from: context.range().from,
                    to: context.range().to,
                    page: cursor.next_page,
                    limit: options.limit,
                    cursor: cursor.cursor.clone(),
                    min_usd: options.min_usd,
                    spam_filter: options.spam_filter,
                    class: options.class.clone(),
                });
            }
            (epoch, requests)
        };

        debug!(
            "Fetching raw round {} for context {} ({} active wallets)",
            index,
            key,
            requests.len()
        );

        let results = try_join_all(
            requests
                .iter()
                .map(|request| self.inner.source.fetch_page(request)),
        )
        .await;

        let mut guard = self.state();
        let state = &mut *guard;

        // A clear already dropped our in-flight marker; a newer fetch may own
        // the slot now, so leave it alone.
        let ctx = match state.contexts.get_mut(&key) {
            Some(ctx) if ctx.epoch == epoch => ctx,
            _ => {
                info!("Discarding raw round {} for cleared context {}", index, key);
                return Err(LegSourceError::Other(
                    "context was cleared while fetching".to_string(),
                ));
            }
        };
        state.in_flight.remove(&(key.clone(), index));

        let pages = match results {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Raw round {} for context {} failed: {}", index, key, e);
                return Err(e);
            }
        };

        let mut batch = Vec::new();
        for (request, page) in requests.iter().zip(pages) {
            let cursor = ctx.cursors.entry(request.address.clone()).or_default();
            cursor.next_page += 1;
            cursor.cursor = page.next_cursor.clone();
            cursor.exhausted = !page.has_next;

            ctx.gas_usd_by_tx.extend(page.gas_usd_by_tx);
            ctx.warnings.merge(&page.warnings);
            batch.extend(page.legs);
        }

        sort_legs_newest_first(&mut batch);
        let new_legs = ctx.merge(batch.clone());
        let has_next = ctx.cursors.values().any(|cursor| !cursor.exhausted);
        let page = RawPage {
            index,
            legs: Arc::new(batch),
            new_legs,
            has_next,
        };
        ctx.pages.insert(index, page.clone());

        debug!(
            "Raw round {} for context {}: {} legs ({} new), has_next={}",
            index,
            key,
            page.legs.len(),
            new_legs,
            has_next
        );
        Ok(page)
    }

    /// Merge legs into a context's accumulated set. Returns how many were new.
    pub fn accumulate(&self, context: &LoadContext, legs: Vec<TransactionLeg>) -> usize {
        let key = context.key();
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.contexts.contains_key(&key) {
            state.next_epoch += 1;
            let epoch = state.next_epoch;
            state
                .contexts
                .insert(key.clone(), ContextState::new(context.clone(), epoch));
        }
        state
            .contexts
            .get_mut(&key)
            .map_or(0, |ctx| ctx.merge(legs))
    }

    pub fn cached_page(&self, context: &LoadContext, index: usize) -> Option<RawPage> {
        self.state()
            .contexts
            .get(&context.key())
            .and_then(|ctx| ctx.pages.get(&index).cloned())
    }

    pub fn snapshot(&self, context: &LoadContext) -> Option<RawSnapshot> {
        self.state()
            .contexts
            .get(&context.key())
            .map(ContextState::snapshot)
    }

    pub fn pages_fetched(&self, context: &LoadContext) -> usize {
        self.state()
            .contexts
            .get(&context.key())
            .map_or(0, |ctx| ctx.pages.len())
    }

    pub fn is_exhausted(&self, context: &LoadContext) -> bool {
        self.state()
            .contexts
            .get(&context.key())
            .map_or(false, ContextState::exhausted)
    }

    pub fn context_count(&self) -> usize {
        self.state().contexts.len()
    }

    /// Drop every context with a wallet starting with `address_prefix`.
    ///
    /// Returns the cleared contexts so dependent caches can drop theirs too.
    pub fn clear_context(&self, address_prefix: &str) -> Vec<LoadContext> {
        let mut guard = self.state();
        let state = &mut *guard;

        let doomed: Vec<ContextKey> = state
            .contexts
            .iter()
            .filter(|(_, ctx)| ctx.context.matches_address_prefix(address_prefix))
            .map(|(key, _)| key.clone())
            .collect();

        let mut cleared = Vec::with_capacity(doomed.len());
        for key in &doomed {
            if let Some(ctx) = state.contexts.remove(key) {
                cleared.push(ctx.context);
            }
        }
        state
            .in_flight
            .retain(|(key, _), _| !doomed.contains(key));

        info!(
            "Cleared {} raw contexts for prefix {}",
            cleared.len(),
            address_prefix
        );
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DateRange;
    use crate::datasource::MockLegSource;
    use crate::domain::{Asset, Direction, Network, TimeMs};
    use std::time::Duration;

    fn make_leg(wallet: &str, timestamp: i64) -> TransactionLeg {
        TransactionLeg::new(
            Address::new(wallet),
            Network::new("ethereum"),
            &format!("0x{}{:x}", wallet.trim_start_matches("0x"), timestamp),
            TimeMs::new(timestamp),
            Direction::In,
            Asset::native("ETH", 18),
            Decimal::from_i64(1),
        )
    }

    fn options(limit: u32) -> FetchOptions {
        FetchOptions {
            limit,
            ..FetchOptions::default()
        }
    }

    #[tokio::test]
    async fn test_round_is_cached() {
        let mock = MockLegSource::new().with_legs((1..=3).map(|t| make_leg("0x1", t)).collect());
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(2));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));

        let first = cache.ensure_raw_page(&ctx, 0).await.unwrap().unwrap();
        let again = cache.ensure_raw_page(&ctx, 0).await.unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(mock.calls(), 1);
        assert!(first.has_next);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let mock = MockLegSource::new()
            .with_legs((1..=3).map(|t| make_leg("0x1", t)).collect())
            .with_delay(Duration::from_millis(20));
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(10));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));

        let (a, b) = tokio::join!(cache.ensure_raw_page(&ctx, 0), cache.ensure_raw_page(&ctx, 0));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_clears_in_flight_and_keeps_earlier_pages() {
        let mock = MockLegSource::new().with_legs((1..=4).map(|t| make_leg("0x1", t)).collect());
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(2));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));

        cache.ensure_raw_page(&ctx, 0).await.unwrap();
        mock.fail_next(1);
        assert!(cache.ensure_raw_page(&ctx, 1).await.is_err());
        assert!(cache.cached_page(&ctx, 0).is_some());
        assert_eq!(cache.snapshot(&ctx).unwrap().legs.len(), 2);

        let retried = cache.ensure_raw_page(&ctx, 1).await.unwrap().unwrap();
        assert_eq!(retried.legs.len(), 2);
        assert_eq!(cache.snapshot(&ctx).unwrap().legs.len(), 4);
    }

    #[tokio::test]
    async fn test_beyond_exhaustion_returns_none() {
        let mock = MockLegSource::new().with_leg(make_leg("0x1", 1));
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(5));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));

        assert!(cache.ensure_raw_page(&ctx, 3).await.unwrap().is_none());
        assert!(cache.is_exhausted(&ctx));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_multi_wallet_rounds_advance_independently() {
        let mut legs: Vec<TransactionLeg> = (1..=5).map(|t| make_leg("0xa", t)).collect();
        legs.push(make_leg("0xb", 100));
        let mock = MockLegSource::new().with_legs(legs);
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(2));
        let ctx = LoadContext::new(
            vec![Address::new("0xa"), Address::new("0xb")],
            Vec::new(),
            DateRange::unbounded(),
        );

        let round0 = cache.ensure_raw_page(&ctx, 0).await.unwrap().unwrap();
        assert_eq!(round0.legs.len(), 3);
        assert_eq!(mock.calls(), 2);

        // 0xb is exhausted after one page; only 0xa is asked again.
        let round1 = cache.ensure_raw_page(&ctx, 1).await.unwrap().unwrap();
        assert_eq!(round1.legs.len(), 2);
        assert_eq!(mock.calls(), 3);

        let round2 = cache.ensure_raw_page(&ctx, 2).await.unwrap().unwrap();
        assert_eq!(round2.legs.len(), 1);
        assert!(!round2.has_next);
        assert_eq!(mock.calls(), 4);
        assert_eq!(cache.snapshot(&ctx).unwrap().legs.len(), 6);
    }

    #[tokio::test]
    async fn test_page_number_fallback_without_cursors() {
        let mock = MockLegSource::new()
            .with_legs((1..=4).map(|t| make_leg("0x1", t)).collect())
            .without_cursors();
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(2));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));

        cache.ensure_raw_page(&ctx, 2).await.unwrap();
        let snapshot = cache.snapshot(&ctx).unwrap();
        assert_eq!(snapshot.legs.len(), 4);
        assert!(snapshot.exhausted);
    }

    #[test]
    fn test_accumulate_deduplicates_and_sorts() {
        let cache = RawPageCache::new(Arc::new(MockLegSource::new()), options(2));
        let ctx = LoadContext::for_wallet(Address::new("0x1"));
        let batch = vec![make_leg("0x1", 1), make_leg("0x1", 3)];

        assert_eq!(cache.accumulate(&ctx, batch.clone()), 2);
        assert_eq!(cache.accumulate(&ctx, batch), 0);
        assert_eq!(cache.accumulate(&ctx, vec![make_leg("0x1", 2)]), 1);

        let snapshot = cache.snapshot(&ctx).unwrap();
        let order: Vec<i64> = snapshot.legs.iter().map(|l| l.timestamp.as_ms()).collect();
        assert_eq!(order, vec![3, 2, 1]);
        let chrono: Vec<i64> = snapshot
            .chronological_legs()
            .iter()
            .map(|l| l.timestamp.as_ms())
            .collect();
        assert_eq!(chrono, vec![1, 2, 3]);
        let arrival: Vec<i64> = snapshot.log.iter().map(|l| l.timestamp.as_ms()).collect();
        assert_eq!(arrival, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_clear_context_by_prefix() {
        let mock = MockLegSource::new()
            .with_leg(make_leg("0xabc", 1))
            .with_leg(make_leg("0xdef", 1));
        let cache = RawPageCache::new(Arc::new(mock.clone()), options(5));
        let abc = LoadContext::for_wallet(Address::new("0xabc"));
        let def = LoadContext::for_wallet(Address::new("0xdef"));
        cache.ensure_raw_page(&abc, 0).await.unwrap();
        cache.ensure_raw_page(&def, 0).await.unwrap();

        let cleared = cache.clear_context("0xAB");
        assert_eq!(cleared, vec![abc.clone()]);
        assert!(cache.snapshot(&abc).is_none());
        assert!(cache.snapshot(&def).is_some());

        cache.ensure_raw_page(&abc, 0).await.unwrap();
        assert_eq!(mock.calls(), 3);
    }
}
