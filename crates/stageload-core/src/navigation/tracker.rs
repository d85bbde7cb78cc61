use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Transitions remembered per origin page
pub const NAVIGATION_HISTORY_WINDOW: usize = 10;

/// A likely next page and how likely it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Prediction {
    pub page: String,
    pub probability: f64,
}

/// How transitions inside the window are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PredictionModel {
    /// Every transition in the window counts the same.
    #[default]
    Frequency,
    /// The newest transition weighs 1, each older one `factor` times the
    /// one after it. Factors outside `(0, 1]` fall back to `Frequency`.
    Decayed { factor: f64 },
}

impl PredictionModel {
    fn weight(&self, age: usize) -> f64 {
        match *self {
            PredictionModel::Decayed { factor } if factor > 0.0 && factor <= 1.0 => {
                factor.powi(age as i32)
            }
            _ => 1.0,
        }
    }
}

/// Records observed page transitions and predicts where a user goes next.
///
/// Clone is cheap; clones share the same history.
#[derive(Clone, Default)]
pub struct NavigationTracker {
    patterns: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    model: PredictionModel,
}

impl NavigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: PredictionModel) -> Self {
        Self {
            patterns: Arc::default(),
            model,
        }
    }

    pub fn model(&self) -> PredictionModel {
        self.model
    }

    /// Record a transition, keeping only the most recent
    /// `NAVIGATION_HISTORY_WINDOW` destinations per origin.
    pub fn track_navigation(&self, from_page: &str, to_page: &str) {
        let mut patterns = self.patterns.lock();
        let history = patterns.entry(from_page.to_string()).or_default();
        history.push_back(to_page.to_string());
        while history.len() > NAVIGATION_HISTORY_WINDOW {
            history.pop_front();
        }
        debug!(from = %from_page, to = %to_page, window = history.len(), "Navigation tracked");
    }

    /// Probability of each destination seen from `current_page`, most
    /// likely first. Ties keep the order destinations first appear in the
    /// window. Unknown pages yield an empty set.
    pub fn predict_next_page(&self, current_page: &str) -> Vec<Prediction> {
        let patterns = self.patterns.lock();
        let Some(history) = patterns.get(current_page) else {
            return Vec::new();
        };

        let newest = history.len().saturating_sub(1);
        let mut weights: Vec<(&str, f64)> = Vec::new();
        let mut total = 0.0;
        for (i, page) in history.iter().enumerate() {
            let weight = self.model.weight(newest - i);
            total += weight;
            match weights.iter_mut().find(|(p, _)| *p == page.as_str()) {
                Some((_, w)) => *w += weight,
                None => weights.push((page.as_str(), weight)),
            }
        }
        if total <= 0.0 {
            return Vec::new();
        }

        let mut predictions: Vec<Prediction> = weights
            .into_iter()
            .map(|(page, weight)| Prediction {
                page: page.to_string(),
                probability: weight / total,
            })
            .collect();
        // Stable sort keeps first-seen order for ties.
        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        predictions
    }

    /// Destinations recorded from `page`, oldest first.
    pub fn history(&self, page: &str) -> Vec<String> {
        self.patterns
            .lock()
            .get(page)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.patterns.lock().clear();
    }
}
