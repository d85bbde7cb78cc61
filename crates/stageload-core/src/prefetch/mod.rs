//! Speculative warming of data ahead of navigation.
//!
//! - `PrefetchStore`: a TTL cache populated only for likely destinations
//! - `AutoPrefetcher`: drives the store from navigation predictions
//!
//! Prefetching is purely an optimization. Failures are logged and dropped,
//! and a miss must always fall back to a real fetch at the call site.

pub mod auto;
pub mod store;

pub use auto::{AutoPrefetcher, FetchRegistry};
pub use store::{PrefetchOutcome, PrefetchStore, PREFETCH_PROBABILITY_THRESHOLD, PREFETCH_TTL};
