//! Filtered page projector: fixed-size pages of legs matching a type filter,
//! built incrementally from the raw arrival log.
//!
//! Each context keeps one projection per filter key. A projection remembers
//! how much of the raw log it has already distributed (`paginated_count`), so
//! growth of the raw set only costs the new suffix. Full pages are frozen
//! behind an `Arc` and never change afterwards; the trailing short page lives
//! in a separate slot until it fills up or the source runs dry.

use super::context::{ContextKey, LoadContext};
use super::filter::FilterKey;
use super::raw::{RawPageCache, RawSnapshot};
use crate::datasource::LegSourceError;
use crate::domain::TransactionLeg;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const PAGE_SIZE: usize = 20;

/// A page as handed to the consumer. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredPage {
    pub filter: FilterKey,
    pub requested_page: usize,
    /// The page actually served; lower than `requested_page` when the filter
    /// has fewer pages than asked for.
    pub page: usize,
    pub page_size: usize,
    pub legs: Vec<TransactionLeg>,
    pub has_next: bool,
    pub source_exhausted: bool,
}

#[derive(Debug, Default)]
struct Projection {
    paginated_count: usize,
    complete: Vec<Arc<Vec<TransactionLeg>>>,
    incomplete: Vec<TransactionLeg>,
}

impl Projection {
    fn absorb(&mut self, filter: FilterKey, log: &[TransactionLeg]) {
        for leg in &log[self.paginated_count..] {
            if !filter.matches(leg) {
                continue;
            }
            self.incomplete.push(leg.clone());
            if self.incomplete.len() == PAGE_SIZE {
                let page = std::mem::take(&mut self.incomplete);
                self.complete.push(Arc::new(page));
            }
        }
        self.paginated_count = log.len();
    }

    /// The source is exhausted: the short trailing page is final.
    fn seal(&mut self) {
        if !self.incomplete.is_empty() {
            let page = std::mem::take(&mut self.incomplete);
            self.complete.push(Arc::new(page));
        }
    }

    /// More matching legs exist past `page` without fetching anything.
    fn has_backlog_after(&self, page: usize) -> bool {
        self.complete.len() > page || (self.complete.len() == page && !self.incomplete.is_empty())
    }
}

#[derive(Debug)]
struct ProjectorState {
    projections: HashMap<FilterKey, Projection>,
    sealed: bool,
}

impl ProjectorState {
    fn new() -> Self {
        let projections = FilterKey::all_keys()
            .into_iter()
            .map(|key| (key, Projection::default()))
            .collect();
        Self {
            projections,
            sealed: false,
        }
    }
}

enum Lookup {
    Ready {
        legs: Arc<Vec<TransactionLeg>>,
        backlog_after: bool,
    },
    Pending,
}

/// Per-context projections for every filter key.
#[derive(Debug, Default)]
pub struct FilteredPageProjector {
    contexts: Mutex<HashMap<ContextKey, ProjectorState>>,
}

impl FilteredPageProjector {
    pub fn new() -> Self {
        Self::default()
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<ContextKey, ProjectorState>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Distribute the unseen suffix of the raw log into every projection.
    pub fn sync(&self, context: &LoadContext, snapshot: &RawSnapshot) {
        let mut contexts = self.contexts();
        let state = contexts
            .entry(context.key())
            .or_insert_with(ProjectorState::new);

        // The raw side was rebuilt underneath us; start over.
        let behind = state
            .projections
            .values()
            .any(|p| p.paginated_count > snapshot.log.len());
        if behind {
            *state = ProjectorState::new();
        }

        for (key, projection) in state.projections.iter_mut() {
            projection.absorb(*key, &snapshot.log);
        }
        if snapshot.exhausted && !state.sealed {
            for projection in state.projections.values_mut() {
                projection.seal();
            }
            state.sealed = true;
        }
    }

    fn sync_from(&self, raw: &RawPageCache, context: &LoadContext) {
        if let Some(snapshot) = raw.snapshot(context) {
            self.sync(context, &snapshot);
        }
    }

    fn lookup(&self, context: &LoadContext, filter: FilterKey, page: usize) -> Lookup {
        let contexts = self.contexts();
        let projection = contexts
            .get(&context.key())
            .and_then(|state| state.projections.get(&filter));
        match projection.and_then(|p| p.complete.get(page - 1).map(|legs| (p, legs))) {
            Some((p, legs)) => Lookup::Ready {
                legs: Arc::clone(legs),
                backlog_after: p.has_backlog_after(page),
            },
            None => Lookup::Pending,
        }
    }

    fn has_backlog_after(&self, context: &LoadContext, filter: FilterKey, page: usize) -> bool {
        self.contexts()
            .get(&context.key())
            .and_then(|state| state.projections.get(&filter))
            .map_or(false, |p| p.has_backlog_after(page))
    }

    /// Number of pages that can be served for `filter` right now.
    pub fn materialized_pages(&self, context: &LoadContext, filter: FilterKey) -> usize {
        self.contexts()
            .get(&context.key())
            .and_then(|state| state.projections.get(&filter))
            .map_or(0, |p| p.complete.len())
    }

    /// Serve page `page` (1-based) for `filter`, fetching raw rounds only as
    /// far as needed to fill it.
    ///
    /// When the source is exhausted before that page exists, the last page
    /// that does exist is served instead and reported in `FilteredPage::page`.
    pub async fn load_page(
        &self,
        raw: &RawPageCache,
        context: &LoadContext,
        filter: FilterKey,
        page: usize,
    ) -> Result<FilteredPage, LegSourceError> {
        let requested = page.max(1);

        loop {
            self.sync_from(raw, context);

            match self.lookup(context, filter, requested) {
                Lookup::Ready {
                    legs,
                    backlog_after,
                } => {
                    let has_next = backlog_after || self.probe(raw, context, filter, requested).await;
                    return Ok(FilteredPage {
                        filter,
                        requested_page: requested,
                        page: requested,
                        page_size: PAGE_SIZE,
                        legs: legs.as_ref().clone(),
                        has_next,
                        source_exhausted: raw.is_exhausted(context),
                    });
                }
                Lookup::Pending if raw.is_exhausted(context) => {
                    let resolved = self.materialized_pages(context, filter).max(1);
                    let legs = match self.lookup(context, filter, resolved) {
                        Lookup::Ready { legs, .. } => legs.as_ref().clone(),
                        Lookup::Pending => Vec::new(),
                    };
                    debug!(
                        "Filter {} has no page {}; serving page {} for context {}",
                        filter,
                        requested,
                        resolved,
                        context.key()
                    );
                    return Ok(FilteredPage {
                        filter,
                        requested_page: requested,
                        page: resolved,
                        page_size: PAGE_SIZE,
                        legs,
                        has_next: false,
                        source_exhausted: true,
                    });
                }
                Lookup::Pending => {
                    raw.ensure_raw_page(context, raw.pages_fetched(context))
                        .await?;
                }
            }
        }
    }

    /// Fetch forward until a leg matching `filter` shows up past `page`, or
    /// the source runs out.
    ///
    /// A failed probe reports `true`: the page itself is fine and the source
    /// may still hold more.
    async fn probe(
        &self,
        raw: &RawPageCache,
        context: &LoadContext,
        filter: FilterKey,
        page: usize,
    ) -> bool {
        loop {
            if raw.is_exhausted(context) {
                self.sync_from(raw, context);
                return self.has_backlog_after(context, filter, page);
            }
            if let Err(e) = raw
                .ensure_raw_page(context, raw.pages_fetched(context))
                .await
            {
                warn!(
                    "Lookahead for filter {} page {} failed: {}",
                    filter, page, e
                );
                return true;
            }
            self.sync_from(raw, context);
            if self.has_backlog_after(context, filter, page) {
                return true;
            }
        }
    }

    /// Drop projections for the given contexts.
    pub fn clear(&self, cleared: &[LoadContext]) {
        let mut contexts = self.contexts();
        for context in cleared {
            contexts.remove(&context.key());
        }
    }
}
