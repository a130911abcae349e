//! Compile pipeline turning chronological legs into a gains report.

use crate::domain::TimeMs;
use thiserror::Error;

pub mod gains;

pub use gains::{GainsCompiler, GainsReport, GainsTotals};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The engine's chronological precondition was violated.
    #[error(
        "leg {leg_id} at {} precedes leg {previous_leg_id} at {}",
        next.as_ms(),
        previous.as_ms()
    )]
    OutOfOrder {
        previous: TimeMs,
        next: TimeMs,
        leg_id: String,
        previous_leg_id: String,
    },
}
