pub mod analytics;
pub mod api;
pub mod cache;
pub mod compile;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use cache::{FilterKey, FilteredPage, LoadContext, RawPageCache};
pub use compile::{GainsCompiler, GainsReport};
pub use config::Config;
pub use datasource::{HttpLegSource, LegSource, LegSourceError, MockLegSource};
pub use domain::{Address, AssetKey, Classification, Decimal, Direction, TimeMs, TransactionLeg};
pub use engine::{CostBasisEngine, CostBasisMethod};
pub use error::AppError;
pub use orchestration::Session;
