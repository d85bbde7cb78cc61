//! Session-scoped bundle of the shared loading state.
//!
//! A `LoadContext` owns one cache, one prefetch store and one navigation
//! tracker. Every clone shares them, so loaders mounted from the same
//! context see each other's cache writes and invalidations. Create one per
//! application session and drop (or `reset`) it on sign-out.

use std::sync::Arc;

use futures::future::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::fetch::Fetcher;
use crate::loader::{LoaderOptions, StagedLoader};
use crate::navigation::{NavigationTracker, Prediction, PredictionModel};
use crate::prefetch::{AutoPrefetcher, FetchRegistry, PrefetchOutcome, PrefetchStore};

#[derive(Clone, Default)]
pub struct LoadContext {
    cache: CacheStore,
    prefetch: PrefetchStore,
    tracker: NavigationTracker,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prediction_model(model: PredictionModel) -> Self {
        Self {
            tracker: NavigationTracker::with_model(model),
            ..Self::default()
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn prefetch_store(&self) -> &PrefetchStore {
        &self.prefetch
    }

    pub fn tracker(&self) -> &NavigationTracker {
        &self.tracker
    }

    /// Activate a staged loader bound to this context's cache.
    pub fn mount<T>(&self, key: impl Into<String>, fetcher: Fetcher<T>, options: LoaderOptions) -> StagedLoader<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        StagedLoader::mount(self.cache.clone(), key, fetcher, options)
    }

    /// Called by the routing layer on every page transition.
    pub fn report_navigation(&self, from_page: &str, to_page: &str) {
        self.tracker.track_navigation(from_page, to_page);
    }

    pub fn predict_next_page(&self, current_page: &str) -> Vec<Prediction> {
        self.tracker.predict_next_page(current_page)
    }

    pub async fn auto_prefetch(
        &self,
        current_page: &str,
        registry: &FetchRegistry,
    ) -> Vec<(String, PrefetchOutcome)> {
        AutoPrefetcher::new(self.tracker.clone(), self.prefetch.clone())
            .auto_prefetch(current_page, registry)
            .await
    }

    pub fn get_prefetched<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.prefetch.get_prefetched(key)
    }

    /// Wrap `fetcher` so a prefetched value for `key` is served once, in
    /// place of the real fetch.
    ///
    /// A hit consumes the prefetched entry, so later calls (refetch, refresh,
    /// a remount after the cache expired) always reach the real fetch.
    pub fn prefetch_aware<T>(&self, key: impl Into<String>, fetcher: Fetcher<T>) -> Fetcher<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key: String = key.into();
        let store = self.prefetch.clone();
        Arc::new(move || {
            if let Some(value) = store.take_prefetched::<T>(&key) {
                debug!(key = %key, "Serving prefetched value");
                return futures::future::ready(Ok(value)).boxed();
            }
            fetcher()
        })
    }

    /// Forget everything: cached data, prefetched data and navigation history.
    pub fn reset(&self) {
        self.cache.clear();
        self.prefetch.clear_prefetch();
        self.tracker.clear();
        info!("Load context reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &Arc<AtomicUsize>, value: &'static str) -> Fetcher<String> {
        let calls = Arc::clone(calls);
        fetcher(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { anyhow::Ok(value.to_string()) }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_aware_uses_hit_then_falls_back() {
        let ctx = LoadContext::new();
        ctx.report_navigation("dashboard", "leases");

        let prefetch_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = FetchRegistry::new();
        registry.register("leases", counting(&prefetch_calls, "warm"));
        ctx.auto_prefetch("dashboard", &registry).await;
        assert_eq!(prefetch_calls.load(Ordering::SeqCst), 1);

        let real_calls = Arc::new(AtomicUsize::new(0));
        let fetch = ctx.prefetch_aware("leases", counting(&real_calls, "cold"));
        assert_eq!(fetch().await.unwrap(), "warm");
        assert_eq!(real_calls.load(Ordering::SeqCst), 0);
        assert!(ctx.prefetch_store().is_empty());

        // The hit was consumed; the entry is not served a second time.
        assert_eq!(fetch().await.unwrap(), "cold");
        assert_eq!(real_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaders_share_context_cache() {
        let ctx = LoadContext::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = ctx.mount("units", counting(&calls, "4B"), LoaderOptions::default());
        assert_eq!(first.ready().await.data.as_deref(), Some("4B"));

        let second = ctx
            .clone()
            .mount("units", counting(&calls, "4B"), LoaderOptions::default());
        assert_eq!(second.ready().await.data.as_deref(), Some("4B"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let ctx = LoadContext::new();
        ctx.cache().insert("units", &"4B").unwrap();
        ctx.report_navigation("a", "b");
        let calls = Arc::new(AtomicUsize::new(0));
        ctx.prefetch_store()
            .prefetch("b", &counting(&calls, "b"), 1.0)
            .await;

        ctx.reset();
        assert!(ctx.cache().is_empty());
        assert!(ctx.prefetch_store().is_empty());
        assert!(ctx.predict_next_page("a").is_empty());
    }

    #[test]
    fn test_prediction_model_is_applied() {
        let ctx = LoadContext::with_prediction_model(PredictionModel::Decayed { factor: 0.5 });
        assert_eq!(ctx.tracker().model(), PredictionModel::Decayed { factor: 0.5 });
    }
}
