use std::time::Duration;

/// Default cache max age (5 minutes)
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_millis(300_000);

/// Delay from mount until the `secondary` flag clears
pub const DEFAULT_SECONDARY_DELAY: Duration = Duration::from_millis(300);

/// Delay from mount until the `background` flag clears
pub const DEFAULT_BACKGROUND_DELAY: Duration = Duration::from_millis(1000);

/// When the `secondary` and `background` flags clear.
///
/// By default both clear on their timers whether or not the critical
/// fetch has resolved. `gate_on_critical` holds them until critical is
/// also done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimings {
    pub secondary: Duration,
    pub background: Duration,
    pub gate_on_critical: bool,
}

impl Default for StageTimings {
    fn default() -> Self {
        Self {
            secondary: DEFAULT_SECONDARY_DELAY,
            background: DEFAULT_BACKGROUND_DELAY,
            gate_on_critical: false,
        }
    }
}

/// Per-activation loader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Serve a fresh cache entry instead of fetching.
    pub use_cache: bool,
    pub cache_max_age: Duration,
    /// Informational only; the loader does not act on it.
    pub prefetch: bool,
    /// Silently re-run the fetch cycle on this period while mounted.
    pub refresh_interval: Option<Duration>,
    pub stage_timings: StageTimings,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            prefetch: true,
            refresh_interval: None,
            stage_timings: StageTimings::default(),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// A zero interval disables refreshing.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn with_stage_timings(mut self, timings: StageTimings) -> Self {
        self.stage_timings = timings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LoaderOptions::default();
        assert!(options.use_cache);
        assert_eq!(options.cache_max_age, Duration::from_secs(300));
        assert!(options.prefetch);
        assert_eq!(options.refresh_interval, None);
        assert_eq!(options.stage_timings.secondary, Duration::from_millis(300));
        assert_eq!(options.stage_timings.background, Duration::from_millis(1000));
        assert!(!options.stage_timings.gate_on_critical);
    }

    #[test]
    fn test_zero_refresh_interval_disables_refresh() {
        let options = LoaderOptions::new().with_refresh_interval(Some(Duration::ZERO));
        assert_eq!(options.refresh_interval, None);

        let options = LoaderOptions::new().with_refresh_interval(Some(Duration::from_secs(30)));
        assert_eq!(options.refresh_interval, Some(Duration::from_secs(30)));
    }
}
