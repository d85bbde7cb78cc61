//! Core library for stageload - staged loading, caching and predictive prefetch.
//!
//! The pieces, leaf first:
//! - `CacheStore`: last successful fetch per key, with freshness checks
//! - `StagedLoader`: drives one fetch through shell/critical/secondary/background
//! - `PrefetchStore`: TTL cache warmed ahead of navigation
//! - `NavigationTracker`: per-page transition history and next-page prediction
//! - `AutoPrefetcher`: feeds predictions into the prefetch store
//!
//! `LoadContext` bundles the shared state for one application session.

pub mod cache;
pub mod context;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod navigation;
pub mod prefetch;

pub use cache::{CacheEntry, CacheStore};
pub use context::LoadContext;
pub use error::LoadError;
pub use fetch::{erase, fetcher, Fetcher};
pub use loader::{LoadSnapshot, LoaderOptions, LoadingState, Stage, StageTimings, StagedLoader};
pub use navigation::{NavigationTracker, Prediction, PredictionModel, NAVIGATION_HISTORY_WINDOW};
pub use prefetch::{
    AutoPrefetcher, FetchRegistry, PrefetchOutcome, PrefetchStore,
    PREFETCH_PROBABILITY_THRESHOLD, PREFETCH_TTL,
};
