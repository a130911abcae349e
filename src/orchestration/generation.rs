//! Generation tokens so a slow load can never overwrite a newer one.
//!
//! In-flight requests are not aborted; their results are dropped on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadToken(u64);

impl LoadToken {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct LoadTracker {
    latest: AtomicU64,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load. Every earlier token becomes stale.
    pub fn begin(&self) -> LoadToken {
        LoadToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome<T> {
    Committed(T),
    /// A newer load started first; carries whatever the slot currently shows.
    Superseded { current: Option<T> },
}

impl<T> LoadOutcome<T> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadOutcome::Superseded { .. })
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            LoadOutcome::Committed(value) => Some(value),
            LoadOutcome::Superseded { current } => current,
        }
    }
}

/// The displayed state of one view plus the tracker guarding it.
#[derive(Debug)]
pub struct ViewSlot<T> {
    tracker: LoadTracker,
    current: Mutex<Option<T>>,
}

impl<T: Clone> ViewSlot<T> {
    pub fn new() -> Self {
        Self {
            tracker: LoadTracker::new(),
            current: Mutex::new(None),
        }
    }

    pub fn begin(&self) -> LoadToken {
        self.tracker.begin()
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        self.tracker.is_current(token)
    }

    /// Store `value` if `token` is still the latest load.
    pub fn commit(&self, token: LoadToken, value: T) -> LoadOutcome<T> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a commit cannot interleave with a newer one.
        if self.tracker.is_current(token) {
            *current = Some(value.clone());
            LoadOutcome::Committed(value)
        } else {
            LoadOutcome::Superseded {
                current: current.clone(),
            }
        }
    }

    /// Outcome for a load that produced nothing to commit.
    pub fn superseded(&self) -> LoadOutcome<T> {
        LoadOutcome::Superseded {
            current: self.current(),
        }
    }

    pub fn current(&self) -> Option<T> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_monotonic() {
        let tracker = LoadTracker::new();
        let a = tracker.begin();
        let b = tracker.begin();
        assert!(b > a);
        assert!(!tracker.is_current(a));
        assert!(tracker.is_current(b));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let slot = ViewSlot::new();
        let a = slot.begin();
        let b = slot.begin();

        assert_eq!(slot.commit(b, "B"), LoadOutcome::Committed("B"));
        assert_eq!(
            slot.commit(a, "A"),
            LoadOutcome::Superseded { current: Some("B") }
        );
        assert_eq!(slot.current(), Some("B"));
    }

    #[test]
    fn test_stale_result_before_newer_commit() {
        let slot: ViewSlot<u32> = ViewSlot::new();
        let a = slot.begin();
        let _b = slot.begin();
        let outcome = slot.commit(a, 1);
        assert!(outcome.is_superseded());
        assert_eq!(outcome.into_value(), None);
        assert_eq!(slot.current(), None);
    }
}
