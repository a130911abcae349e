//! Load coordination: the session cache object and stale-load discarding.

pub mod generation;
pub mod session;

pub use generation::{LoadOutcome, LoadToken, LoadTracker, ViewSlot};
pub use session::{
    AnalyticsView, GainsView, HistoryLoad, Session, SessionError, DEFAULT_MAX_HISTORY_ROUNDS,
};
