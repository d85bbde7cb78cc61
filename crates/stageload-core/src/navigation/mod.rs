//! Page-to-page transition history and next-page prediction.

pub mod tracker;

pub use tracker::{NavigationTracker, Prediction, PredictionModel, NAVIGATION_HISTORY_WINDOW};
