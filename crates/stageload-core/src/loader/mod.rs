//! Progressive, staged loading of one logical piece of screen data.
//!
//! A `StagedLoader` walks four visibility stages:
//! - `shell`: cleared immediately on mount
//! - `critical`: cleared when the fetch (or cache hit) resolves
//! - `secondary`, `background`: cleared on fixed delays from mount
//!
//! Consumers watch a `LoadSnapshot` and reveal UI as flags clear. Stage
//! flags and data availability are independent signals.

pub mod options;
pub mod staged;
pub mod state;

pub use options::{LoaderOptions, StageTimings};
pub use staged::StagedLoader;
pub use state::{LoadSnapshot, LoadingState, Stage};
