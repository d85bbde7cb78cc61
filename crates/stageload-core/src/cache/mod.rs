//! In-memory cache of the last successful fetch per logical key.
//!
//! This module provides the `CacheStore` shared by every loader mounted
//! from the same `LoadContext`. Values are held as JSON and decoded on read,
//! each stamped with the instant it was fetched so freshness can be checked
//! against a per-loader max age.
//!
//! Nothing here is persisted; a new session starts with an empty store.

pub mod entry;
pub mod store;

pub use entry::CacheEntry;
pub use store::CacheStore;
