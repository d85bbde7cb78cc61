use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{PrefetchOutcome, PrefetchStore};
use crate::fetch::{erase, Fetcher};
use crate::navigation::NavigationTracker;

/// Fetch functions for the pages a screen knows how to warm.
#[derive(Clone, Default)]
pub struct FetchRegistry {
    fetchers: HashMap<String, Fetcher<Value>>,
}

impl FetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, page: impl Into<String>, fetcher: Fetcher<T>) -> &mut Self
    where
        T: Serialize + Send + 'static,
    {
        self.fetchers.insert(page.into(), erase(fetcher));
        self
    }

    pub fn get(&self, page: &str) -> Option<&Fetcher<Value>> {
        self.fetchers.get(page)
    }

    pub fn contains(&self, page: &str) -> bool {
        self.fetchers.contains_key(page)
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

/// Warms the prefetch store for the pages a user is likely to open next.
#[derive(Clone)]
pub struct AutoPrefetcher {
    tracker: NavigationTracker,
    store: PrefetchStore,
}

impl AutoPrefetcher {
    pub fn new(tracker: NavigationTracker, store: PrefetchStore) -> Self {
        Self { tracker, store }
    }

    /// Prefetch every predicted destination of `current_page` that has a
    /// registered fetcher, one at a time, most likely first.
    ///
    /// Returns the outcome for each destination that was attempted.
    pub async fn auto_prefetch(
        &self,
        current_page: &str,
        registry: &FetchRegistry,
    ) -> Vec<(String, PrefetchOutcome)> {
        let predictions = self.tracker.predict_next_page(current_page);
        let mut outcomes = Vec::with_capacity(predictions.len());

        for prediction in predictions {
            let Some(fetch) = registry.get(&prediction.page) else {
                debug!(page = %prediction.page, "No fetcher registered, skipping prefetch");
                continue;
            };
            let outcome = self
                .store
                .prefetch(&prediction.page, fetch, prediction.probability)
                .await;
            outcomes.push((prediction.page, outcome));
        }

        debug!(from = %current_page, attempted = outcomes.len(), "Auto-prefetch complete");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetcher;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(log: &Arc<Mutex<Vec<String>>>, page: &'static str) -> Fetcher<String> {
        let log = Arc::clone(log);
        fetcher(move || {
            log.lock().push(page.to_string());
            async move { anyhow::Ok(format!("{page} data")) }
        })
    }

    fn setup() -> (NavigationTracker, PrefetchStore, AutoPrefetcher) {
        let tracker = NavigationTracker::new();
        let store = PrefetchStore::new();
        let auto = AutoPrefetcher::new(tracker.clone(), store.clone());
        (tracker, store, auto)
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetches_in_probability_order() {
        let (tracker, store, auto) = setup();
        for to in ["leases", "payments", "payments", "payments", "leases"] {
            tracker.track_navigation("dashboard", to);
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FetchRegistry::new();
        registry
            .register("leases", recording(&log, "leases"))
            .register("payments", recording(&log, "payments"));

        let outcomes = auto.auto_prefetch("dashboard", &registry).await;
        assert_eq!(
            outcomes,
            vec![
                ("payments".to_string(), PrefetchOutcome::Stored),
                ("leases".to_string(), PrefetchOutcome::Stored),
            ]
        );
        assert_eq!(*log.lock(), vec!["payments", "leases"]);
        assert_eq!(
            store.get_prefetched::<String>("payments").as_deref(),
            Some("payments data")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_unregistered_and_unlikely_pages() {
        let (tracker, store, auto) = setup();
        for _ in 0..8 {
            tracker.track_navigation("dashboard", "payments");
        }
        tracker.track_navigation("dashboard", "tax-forms");
        tracker.track_navigation("dashboard", "maintenance");

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FetchRegistry::new();
        registry.register("tax-forms", recording(&log, "tax-forms"));

        let outcomes = auto.auto_prefetch("dashboard", &registry).await;
        assert_eq!(
            outcomes,
            vec![("tax-forms".to_string(), PrefetchOutcome::BelowThreshold)]
        );
        assert!(log.lock().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_page_does_nothing() {
        let (_tracker, store, auto) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FetchRegistry::new();
        registry.register("leases", recording(&log, "leases"));

        assert!(auto.auto_prefetch("nowhere", &registry).await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_prefetch_is_swallowed() {
        let (tracker, store, auto) = setup();
        tracker.track_navigation("dashboard", "screening");

        let mut registry = FetchRegistry::new();
        registry.register(
            "screening",
            fetcher(|| async { Err::<String, _>(anyhow::anyhow!("bureau offline")) }),
        );

        let outcomes = auto.auto_prefetch("dashboard", &registry).await;
        assert_eq!(outcomes, vec![("screening".to_string(), PrefetchOutcome::Failed)]);
        assert!(store.get_prefetched_value("screening").is_none());
    }
}
