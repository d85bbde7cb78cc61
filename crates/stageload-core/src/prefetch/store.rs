use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::fetch::Fetcher;

/// How long a prefetched value stays usable (5 minutes)
pub const PREFETCH_TTL: Duration = Duration::from_millis(300_000);

/// Destinations predicted below this probability are never prefetched
pub const PREFETCH_PROBABILITY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone)]
struct PrefetchEntry {
    data: Value,
    stored_at: Instant,
}

impl PrefetchEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < PREFETCH_TTL
    }
}

/// What a call to `prefetch` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
    BelowThreshold,
    AlreadyFresh,
    Stored,
    /// The fetch (or encoding its result) failed; nothing was stored.
    Failed,
}

/// Shared TTL cache of speculatively fetched values.
///
/// Expired entries are only removed when read; there is no sweeper.
#[derive(Clone, Default)]
pub struct PrefetchStore {
    entries: Arc<Mutex<HashMap<String, PrefetchEntry>>>,
}

impl PrefetchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and store `key` if `probability` clears the threshold and no
    /// fresh entry exists yet.
    pub async fn prefetch<T>(&self, key: &str, fetch: &Fetcher<T>, probability: f64) -> PrefetchOutcome
    where
        T: Serialize,
    {
        if probability.is_nan() || probability < PREFETCH_PROBABILITY_THRESHOLD {
            debug!(key = %key, probability, "Prefetch skipped, probability too low");
            return PrefetchOutcome::BelowThreshold;
        }
        if self.has_fresh(key) {
            debug!(key = %key, "Prefetch skipped, entry still fresh");
            return PrefetchOutcome::AlreadyFresh;
        }

        let value = match fetch().await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Prefetch failed");
                return PrefetchOutcome::Failed;
            }
        };
        let data = match serde_json::to_value(&value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Prefetched value could not be encoded");
                return PrefetchOutcome::Failed;
            }
        };

        self.entries.lock().insert(
            key.to_string(),
            PrefetchEntry {
                data,
                stored_at: Instant::now(),
            },
        );
        debug!(key = %key, probability, "Prefetched");
        PrefetchOutcome::Stored
    }

    /// Look up a prefetched value, decoded as `T`.
    ///
    /// Expired entries are evicted and reported as a miss, as is a value
    /// that does not decode as `T`.
    pub fn get_prefetched<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.get_prefetched_value(key)?;
        decode(key, &data)
    }

    /// Remove the entry for `key` and return it if it was still fresh.
    ///
    /// A taken value serves exactly one load; the next read misses.
    pub fn take_prefetched<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.lock().remove(key)?;
        if !entry.is_fresh() {
            debug!(key = %key, "Prefetched entry expired");
            return None;
        }
        decode(key, &entry.data)
    }

    /// Untyped variant of `get_prefetched`.
    pub fn get_prefetched_value(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(key).map(PrefetchEntry::is_fresh)?;
        if fresh {
            entries.get(key).map(|e| e.data.clone())
        } else {
            entries.remove(key);
            debug!(key = %key, "Prefetched entry expired");
            None
        }
    }

    pub fn clear_prefetch(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn has_fresh(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .map(PrefetchEntry::is_fresh)
            .unwrap_or(false)
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: &Value) -> Option<T> {
    match T::deserialize(data) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key = %key, error = %e, "Prefetched value has unexpected shape");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &Arc<AtomicUsize>) -> Fetcher<Vec<String>> {
        let calls = Arc::clone(calls);
        fetcher(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(vec!["invoice 1042".to_string()]) }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_threshold_never_fetches() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = store.prefetch("payments", &counting(&calls), 0.1).await;
        assert_eq!(outcome, PrefetchOutcome::BelowThreshold);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_is_inclusive() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = store
            .prefetch("payments", &counting(&calls), PREFETCH_PROBABILITY_THRESHOLD)
            .await;
        assert_eq!(outcome, PrefetchOutcome::Stored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_not_fetched_twice() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting(&calls);

        assert_eq!(store.prefetch("payments", &fetch, 0.9).await, PrefetchOutcome::Stored);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(
            store.prefetch("payments", &fetch, 0.9).await,
            PrefetchOutcome::AlreadyFresh
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            store.get_prefetched::<Vec<String>>("payments"),
            Some(vec!["invoice 1042".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        store.prefetch("payments", &counting(&calls), 0.9).await;

        tokio::time::advance(PREFETCH_TTL).await;
        assert_eq!(store.len(), 1);
        assert!(store.get_prefetched::<Vec<String>>("payments").is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting(&calls);
        store.prefetch("payments", &fetch, 0.9).await;

        tokio::time::advance(PREFETCH_TTL + Duration::from_millis(1)).await;
        assert_eq!(store.prefetch("payments", &fetch, 0.9).await, PrefetchOutcome::Stored);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_no_entry() {
        let store = PrefetchStore::new();
        let failing = fetcher(|| async { Err::<u32, _>(anyhow::anyhow!("timeout")) });
        assert_eq!(store.prefetch("leases", &failing, 0.8).await, PrefetchOutcome::Failed);
        assert!(store.get_prefetched_value("leases").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_prefetch() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        store.prefetch("a", &counting(&calls), 1.0).await;
        store.prefetch("b", &counting(&calls), 1.0).await;
        assert_eq!(store.len(), 2);

        store.clear_prefetch();
        assert!(store.is_empty());
        assert!(store.get_prefetched_value("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_prefetched_serves_once() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        store.prefetch("payments", &counting(&calls), 0.9).await;

        assert_eq!(
            store.take_prefetched::<Vec<String>>("payments"),
            Some(vec!["invoice 1042".to_string()])
        );
        assert!(store.is_empty());
        assert!(store.take_prefetched::<Vec<String>>("payments").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_prefetched_drops_expired_entry() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        store.prefetch("payments", &counting(&calls), 0.9).await;

        tokio::time::advance(PREFETCH_TTL).await;
        assert!(store.take_prefetched::<Vec<String>>("payments").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nan_probability_is_rejected() {
        let store = PrefetchStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = store.prefetch("a", &counting(&calls), f64::NAN).await;
        assert_eq!(outcome, PrefetchOutcome::BelowThreshold);
    }
}
