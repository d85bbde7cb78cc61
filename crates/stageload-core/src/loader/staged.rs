use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LoadSnapshot, LoaderOptions, Stage};
use crate::cache::{CacheEntry, CacheStore};
use crate::error::LoadError;
use crate::fetch::Fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    /// First fetch after mount.
    Critical,
    /// Interval-driven, leaves stage flags alone.
    Refresh,
    /// Consumer-requested, always goes to the network.
    Refetch,
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cycle::Critical => "critical",
            Cycle::Refresh => "refresh",
            Cycle::Refetch => "refetch",
        })
    }
}

struct LoaderInner<T> {
    key: String,
    fetcher: Fetcher<T>,
    options: LoaderOptions,
    cache: CacheStore,
    state: watch::Sender<LoadSnapshot<T>>,
    live: CancellationToken,
    /// Bumped every time new data is installed; a staleness timer only
    /// fires for the generation it was scheduled for.
    generation: AtomicU64,
    /// The pending staleness timer and the generation it belongs to.
    stale_timer: Mutex<Option<(u64, JoinHandle<()>)>>,
}

/// A mounted, staged loader for a single cache key.
///
/// Dropping the loader unmounts it.
pub struct StagedLoader<T> {
    inner: Arc<LoaderInner<T>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> StagedLoader<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Activate a loader. Must be called from within a Tokio runtime.
    ///
    /// `shell` is already clear in the first observable snapshot; the
    /// critical cycle, the stage reveal timers and the optional refresh
    /// loop are spawned before this returns.
    pub fn mount(
        cache: CacheStore,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: LoaderOptions,
    ) -> Self {
        let (state, _) = watch::channel(LoadSnapshot::pending());
        let inner = Arc::new(LoaderInner {
            key: key.into(),
            fetcher,
            options,
            cache,
            state,
            live: CancellationToken::new(),
            generation: AtomicU64::new(0),
            stale_timer: Mutex::new(None),
        });

        info!(
            key = %inner.key,
            use_cache = inner.options.use_cache,
            max_age = ?inner.options.cache_max_age,
            "Loader mounted"
        );

        inner.update(|s| s.loading.clear(Stage::Shell));

        // Fetch tasks are not tracked: they run to completion even after
        // unmount and simply stop writing to the snapshot.
        tokio::spawn(Arc::clone(&inner).run_cycle(Cycle::Critical));

        let timings = inner.options.stage_timings;
        let mut timers = vec![
            Self::spawn_reveal(&inner, Stage::Secondary, timings.secondary, timings.gate_on_critical),
            Self::spawn_reveal(&inner, Stage::Background, timings.background, timings.gate_on_critical),
        ];
        if let Some(period) = inner.options.refresh_interval.filter(|d| !d.is_zero()) {
            match Instant::now().checked_add(period) {
                Some(start) => timers.push(Self::spawn_refresh(&inner, start, period)),
                None => warn!(key = %inner.key, period = ?period, "Refresh interval too large, refresh disabled"),
            }
        }

        Self {
            inner,
            timers: Mutex::new(timers),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> LoadSnapshot<T> {
        (*self.inner.state.borrow()).clone()
    }

    /// Receive every snapshot change. After unmount the receiver keeps the
    /// last snapshot and never changes again.
    pub fn subscribe(&self) -> watch::Receiver<LoadSnapshot<T>> {
        self.inner.state.subscribe()
    }

    /// Wait until the critical stage has cleared and return that snapshot.
    ///
    /// Returns the last snapshot immediately if the loader is unmounted.
    pub async fn ready(&self) -> LoadSnapshot<T> {
        let mut rx = self.subscribe();
        let settled = tokio::select! {
            res = rx.wait_for(|s| !s.loading.critical) => res.ok().map(|s| (*s).clone()),
            _ = self.inner.live.cancelled() => None,
        };
        settled.unwrap_or_else(|| self.snapshot())
    }

    /// Drop the cache entry for this key and fetch again.
    ///
    /// The entry is removed for every consumer sharing the cache. Failures
    /// land in the snapshot's `error` field; nothing is returned.
    pub async fn refetch(&self) {
        if !self.is_mounted() {
            debug!(key = %self.inner.key, "Refetch ignored after unmount");
            return;
        }

        info!(key = %self.inner.key, "Refetch requested");
        self.inner.cache.invalidate(&self.inner.key);

        // Spawned so a dropped caller does not cancel the request.
        let cycle = tokio::spawn(Arc::clone(&self.inner).run_cycle(Cycle::Refetch));
        if let Err(e) = cycle.await {
            warn!(key = %self.inner.key, error = %e, "Refetch task failed");
        }
    }

    fn spawn_reveal(
        inner: &Arc<LoaderInner<T>>,
        stage: Stage,
        delay: Duration,
        gate_on_critical: bool,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        let mut rx = inner.state.subscribe();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if gate_on_critical {
                let _ = rx.wait_for(|s| !s.loading.critical).await;
            }
            if inner.update(|s| s.loading.clear(stage)) {
                debug!(key = %inner.key, stage = %stage, "Stage revealed");
            }
        })
    }

    fn spawn_refresh(inner: &Arc<LoaderInner<T>>, start: Instant, period: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.live.cancelled() => break,
                    _ = ticker.tick() => {
                        let cycle = tokio::spawn(Arc::clone(&inner).run_cycle(Cycle::Refresh));
                        if let Err(e) = cycle.await {
                            warn!(key = %inner.key, error = %e, "Refresh task failed");
                        }
                    }
                }
            }
        })
    }
}

impl<T> StagedLoader<T> {
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    pub fn is_mounted(&self) -> bool {
        !self.inner.live.is_cancelled()
    }

    /// Detach the consumer. No snapshot change is published afterwards.
    pub fn unmount(&self) {
        if !self.is_mounted() {
            return;
        }

        // Cancel under the watch lock so an in-progress write either
        // finishes first or sees the cancellation.
        let live = &self.inner.live;
        self.inner.state.send_if_modified(|_| {
            live.cancel();
            false
        });

        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
        if let Some((_, handle)) = self.inner.stale_timer.lock().take() {
            handle.abort();
        }

        info!(key = %self.inner.key, "Loader unmounted");
    }
}

impl<T> Drop for StagedLoader<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<T> LoaderInner<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Apply `f` to the snapshot unless the consumer has detached.
    /// Subscribers are notified only when `f` reports a change.
    fn update(&self, f: impl FnOnce(&mut LoadSnapshot<T>) -> bool) -> bool {
        let live = &self.live;
        self.state
            .send_if_modified(|snapshot| !live.is_cancelled() && f(snapshot))
    }

    async fn run_cycle(self: Arc<Self>, cycle: Cycle) {
        if self.live.is_cancelled() {
            return;
        }

        if cycle != Cycle::Refetch && self.options.use_cache {
            if let Some(entry) = self
                .cache
                .get_fresh::<T>(&self.key, self.options.cache_max_age)
            {
                debug!(key = %self.key, cycle = %cycle, "Cache hit");
                self.install(entry, cycle);
                return;
            }
            debug!(key = %self.key, cycle = %cycle, "Cache miss");
        }

        if cycle == Cycle::Refetch {
            self.update(|s| s.loading.set_pending(Stage::Critical));
        }

        match (self.fetcher)().await {
            Ok(value) => {
                // The shared cache is written even if this consumer detached
                // while the request was in flight.
                let entry = match self.cache.insert(&self.key, &value) {
                    Ok(stored) => stored.map(|_| value),
                    Err(e) => {
                        warn!(key = %self.key, error = %e, "Failed to cache fetched value");
                        CacheEntry::new(value)
                    }
                };
                debug!(key = %self.key, cycle = %cycle, "Fetch complete");
                self.install(entry, cycle);
            }
            Err(e) => {
                warn!(key = %self.key, cycle = %cycle, error = %e, "Fetch failed");
                let error = Arc::new(LoadError::fetch(&self.key, &e));
                self.update(|s| {
                    s.error = Some(error);
                    if cycle != Cycle::Refresh {
                        s.loading.clear(Stage::Critical);
                    }
                    true
                });
            }
        }
    }

    fn install(self: &Arc<Self>, entry: CacheEntry<T>, cycle: Cycle) {
        let remaining = entry.remaining(self.options.cache_max_age);
        let mut generation = 0;
        let applied = self.update(|s| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            s.data = Some(entry.value);
            s.fetched_at = Some(entry.recorded_at);
            s.error = None;
            s.is_stale = remaining.is_zero();
            if cycle != Cycle::Refresh {
                s.loading.clear(Stage::Critical);
            }
            true
        });
        if applied && !remaining.is_zero() {
            self.schedule_stale(generation, remaining);
        }
    }

    /// Replace the staleness timer with one for `generation`, unless a
    /// newer install already scheduled its own.
    fn schedule_stale(self: &Arc<Self>, generation: u64, after: Duration) {
        let mut slot = self.stale_timer.lock();
        if self.live.is_cancelled() {
            return;
        }
        if let Some((scheduled, _)) = slot.as_ref() {
            if *scheduled > generation {
                debug!(key = %self.key, generation, scheduled = *scheduled, "Superseded staleness timer skipped");
                return;
            }
        }
        if let Some((_, previous)) = slot.take() {
            previous.abort();
        }

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let marked = inner.update(|s| {
                if inner.generation.load(Ordering::SeqCst) != generation || s.is_stale {
                    return false;
                }
                s.is_stale = true;
                true
            });
            if marked {
                debug!(key = %inner.key, "Data marked stale");
            }
        });
        *slot = Some((generation, handle));
    }
}
