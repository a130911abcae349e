//! Pure computation engine(s) for deterministic cost-basis logic.

pub mod cost_basis;
pub mod unrealized;

pub use cost_basis::{
    CostBasisEngine, CostBasisLot, CostBasisMethod, RealizedGainEntry, UnknownMethod,
    UnmatchedSale, LONG_TERM_DAYS,
};
pub use unrealized::{unrealized_positions, UnrealizedPosition};
