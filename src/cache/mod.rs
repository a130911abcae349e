//! Client-side transaction cache: raw rounds per context and the filtered
//! pages projected from them.

pub mod context;
pub mod filter;
pub mod filtered;
pub mod raw;

pub use context::{ContextKey, DateRange, LoadContext};
pub use filter::{FilterKey, FilterParseError, FILTER_KEY_SPACE};
pub use filtered::{FilteredPage, FilteredPageProjector, PAGE_SIZE};
pub use raw::{FetchOptions, RawPage, RawPageCache, RawSnapshot};
