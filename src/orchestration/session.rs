use crate::analytics::{self, AnalyticsReport};
use crate::cache::{
    ContextKey, FetchOptions, FilterKey, FilteredPage, FilteredPageProjector, LoadContext,
    RawPageCache, RawSnapshot,
};
use crate::compile::{CompileError, GainsCompiler, GainsReport};
use crate::datasource::{LegSource, LegSourceError};
use crate::domain::{AssetKey, Decimal, TimeMs};
use crate::engine::{unrealized_positions, CostBasisMethod, UnrealizedPosition};
use crate::orchestration::generation::{LoadOutcome, ViewSlot};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_HISTORY_ROUNDS: usize = 50;

/// Named views kept at once; the least recently used one is dropped beyond this.
pub const MAX_VIEWS: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] LegSourceError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Everything loaded for one context, plus whether it is the whole history.
#[derive(Debug, Clone)]
pub struct HistoryLoad {
    pub snapshot: RawSnapshot,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GainsView {
    #[serde(flatten)]
    pub report: Arc<GainsReport>,
    pub history_complete: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsView {
    #[serde(flatten)]
    pub report: AnalyticsReport,
    pub unrealized: Vec<UnrealizedPosition>,
    pub history_complete: bool,
    pub warnings: Vec<String>,
}

/// Memoized gains, valid while the context's epoch and leg count are unchanged.
struct GainsMemo {
    epoch: u64,
    leg_count: usize,
    report: Arc<GainsReport>,
}

/// View slots by name, most recently used at the back of `recent`.
#[derive(Default)]
struct ViewRegistry {
    slots: HashMap<String, Arc<ViewSlot<FilteredPage>>>,
    recent: VecDeque<String>,
}

impl ViewRegistry {
    fn get_or_create(&mut self, name: &str) -> Arc<ViewSlot<FilteredPage>> {
        if let Some(slot) = self.slots.get(name) {
            let slot = Arc::clone(slot);
            self.recent.retain(|n| n != name);
            self.recent.push_back(name.to_string());
            return slot;
        }

        while self.slots.len() >= MAX_VIEWS {
            let Some(oldest) = self.recent.pop_front() else {
                break;
            };
            self.slots.remove(&oldest);
            debug!("Evicted view {}", oldest);
        }

        let slot = Arc::new(ViewSlot::new());
        self.slots.insert(name.to_string(), Arc::clone(&slot));
        self.recent.push_back(name.to_string());
        slot
    }
}

/// The per-process cache object, injected wherever loads happen.
pub struct Session {
    raw: RawPageCache,
    projector: FilteredPageProjector,
    method: CostBasisMethod,
    max_history_rounds: usize,
    views: Mutex<ViewRegistry>,
    gains_memo: Mutex<HashMap<(ContextKey, CostBasisMethod), GainsMemo>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("raw", &self.raw)
            .field("method", &self.method)
            .field("max_history_rounds", &self.max_history_rounds)
            .finish()
    }
}

impl Session {
    pub fn new(
        source: Arc<dyn LegSource>,
        options: FetchOptions,
        method: CostBasisMethod,
        max_history_rounds: usize,
    ) -> Self {
        Self {
            raw: RawPageCache::new(source, options),
            projector: FilteredPageProjector::new(),
            method,
            max_history_rounds: max_history_rounds.max(1),
            views: Mutex::new(ViewRegistry::default()),
            gains_memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn raw(&self) -> &RawPageCache {
        &self.raw
    }

    pub fn projector(&self) -> &FilteredPageProjector {
        &self.projector
    }

    pub fn method(&self) -> CostBasisMethod {
        self.method
    }

    /// The slot for a named view, created on first use.
    ///
    /// At most [`MAX_VIEWS`] slots are held; a load still running against an
    /// evicted slot completes but is no longer visible through this session.
    pub fn view(&self, name: &str) -> Arc<ViewSlot<FilteredPage>> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_create(name)
    }

    pub fn view_count(&self) -> usize {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<(ContextKey, CostBasisMethod), GainsMemo>> {
        self.gains_memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a filtered page into `view`.
    ///
    /// If another load for the same view starts before this one finishes, the
    /// result (or error) of this one is discarded.
    pub async fn load_page(
        &self,
        view: &str,
        context: &LoadContext,
        filter: FilterKey,
        page: usize,
    ) -> Result<LoadOutcome<FilteredPage>, LegSourceError> {
        let slot = self.view(view);
        let token = slot.begin();

        let result = self
            .projector
            .load_page(&self.raw, context, filter, page)
            .await;

        match result {
            Ok(page) => {
                let outcome = slot.commit(token, page);
                if outcome.is_superseded() {
                    warn!(
                        "Discarding superseded load {} for view {}",
                        token.generation(),
                        view
                    );
                }
                Ok(outcome)
            }
            Err(_) if !slot.is_current(token) => Ok(slot.superseded()),
            Err(e) => Err(e),
        }
    }

    /// Fetch raw rounds until the source is exhausted or the round bound is hit.
    pub async fn load_history(&self, context: &LoadContext) -> Result<HistoryLoad, LegSourceError> {
        let start = self.raw.pages_fetched(context);
        for index in start..self.max_history_rounds {
            if self.raw.ensure_raw_page(context, index).await?.is_none() {
                break;
            }
            if self.raw.is_exhausted(context) {
                break;
            }
        }

        let complete = self.raw.is_exhausted(context);
        let snapshot = self.raw.snapshot(context).unwrap_or_default();
        info!(
            "History for {}: {} legs over {} rounds (complete: {})",
            context.key(),
            snapshot.legs.len(),
            snapshot.pages_fetched,
            complete
        );
        Ok(HistoryLoad { snapshot, complete })
    }

    fn compile_memoized(
        &self,
        context: &LoadContext,
        method: CostBasisMethod,
        snapshot: &RawSnapshot,
    ) -> Result<Arc<GainsReport>, CompileError> {
        let key = (context.key(), method);
        if let Some(memo) = self.memo().get(&key) {
            if memo.epoch == snapshot.epoch && memo.leg_count == snapshot.legs.len() {
                return Ok(memo.report.clone());
            }
        }

        let report = Arc::new(GainsCompiler::compile(method, &snapshot.chronological_legs())?);
        self.memo().insert(
            key,
            GainsMemo {
                epoch: snapshot.epoch,
                leg_count: snapshot.legs.len(),
                report: report.clone(),
            },
        );
        Ok(report)
    }

    /// Realized gains over the whole loadable history of `context`.
    pub async fn gains(
        &self,
        context: &LoadContext,
        method: Option<CostBasisMethod>,
    ) -> Result<GainsView, SessionError> {
        let history = self.load_history(context).await?;
        let report = self.compile_memoized(context, method.unwrap_or(self.method), &history.snapshot)?;
        let warnings = history_warnings(&history, &report);
        Ok(GainsView {
            report,
            history_complete: history.complete,
            warnings,
        })
    }

    /// Analytics plus unrealized positions valued at `prices`.
    pub async fn analytics(
        &self,
        context: &LoadContext,
        method: Option<CostBasisMethod>,
        prices: &HashMap<AssetKey, Decimal>,
    ) -> Result<AnalyticsView, SessionError> {
        let history = self.load_history(context).await?;
        let gains = self.compile_memoized(context, method.unwrap_or(self.method), &history.snapshot)?;
        let report = analytics::summarize(
            &history.snapshot.legs,
            &history.snapshot.gas_usd_by_tx,
            &gains,
            TimeMs::now(),
        );
        Ok(AnalyticsView {
            report,
            unrealized: unrealized_positions(&gains.open_lots, prices),
            history_complete: history.complete,
            warnings: history_warnings(&history, &gains),
        })
    }

    /// Drop every context whose wallets start with `address_prefix`.
    pub fn refresh(&self, address_prefix: &str) -> usize {
        let cleared = self.raw.clear_context(address_prefix);
        self.projector.clear(&cleared);

        let keys: Vec<ContextKey> = cleared.iter().map(LoadContext::key).collect();
        self.memo().retain(|(key, _), _| !keys.contains(key));

        info!(
            "Refreshed {} contexts for prefix {}",
            cleared.len(),
            address_prefix
        );
        cleared.len()
    }
}

fn history_warnings(history: &HistoryLoad, report: &GainsReport) -> Vec<String> {
    let mut warnings = Vec::new();
    if !history.complete {
        warnings.push("history_incomplete".to_string());
    }
    if report.has_unmatched() {
        warnings.push("unmatched_sales".to_string());
    }
    warnings.extend(history.snapshot.warnings.raised());
    warnings
}
