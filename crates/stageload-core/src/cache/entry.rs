use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

const SECS_PER_MINUTE: u64 = 60;
const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 1440;

/// The last successfully fetched value for a key.
///
/// Entries are only ever created from a successful fetch and are replaced
/// wholesale by the next one.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(skip)]
    pub fetched_at: Instant,
    pub recorded_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            recorded_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Fresh means strictly younger than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }

    /// Time left before this entry goes stale (zero if already stale).
    pub fn remaining(&self, max_age: Duration) -> Duration {
        max_age.saturating_sub(self.age())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            fetched_at: self.fetched_at,
            recorded_at: self.recorded_at,
        }
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age().as_secs() / SECS_PER_MINUTE;
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < MINUTES_PER_HOUR {
            format!("{}m ago", minutes)
        } else if minutes < MINUTES_PER_DAY {
            let hours = minutes / MINUTES_PER_HOUR;
            // Round up: 1h 30m+ becomes 2h
            if minutes % MINUTES_PER_HOUR >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / MINUTES_PER_DAY;
            let remaining_hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
