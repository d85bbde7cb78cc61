use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::CacheEntry;
use crate::error::LoadError;

/// Shared store of the last successful fetch per key.
///
/// Clone is cheap and every clone sees the same entries; any holder may
/// invalidate a key for everyone else. Writes are last-write-wins.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry<Value>>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the entry for `key`, decoded as `T`.
    ///
    /// A payload that does not decode as `T` is reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.read().get(key).cloned()?;
        match Self::decode(key, entry) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key = %key, error = %e, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    /// Load the entry for `key` only if it is younger than `max_age`.
    pub fn get_fresh<T: DeserializeOwned>(
        &self,
        key: &str,
        max_age: Duration,
    ) -> Option<CacheEntry<T>> {
        let entry = self.get::<T>(key)?;
        if entry.is_fresh(max_age) {
            Some(entry)
        } else {
            debug!(key = %key, age = ?entry.age(), "Cache entry expired");
            None
        }
    }

    /// Replace the entry for `key` with a freshly stamped value.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<CacheEntry<Value>, LoadError> {
        let json = serde_json::to_value(value).map_err(|source| LoadError::Encode {
            key: key.to_string(),
            source,
        })?;
        let entry = CacheEntry::new(json);
        self.entries.write().insert(key.to_string(), entry.clone());
        debug!(key = %key, "Cache entry stored");
        Ok(entry)
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Human readable age of the entry for `key`, if any.
    pub fn age_display(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).map(CacheEntry::age_display)
    }

    fn decode<T: DeserializeOwned>(
        key: &str,
        entry: CacheEntry<Value>,
    ) -> Result<CacheEntry<T>, LoadError> {
        let value = T::deserialize(&entry.value).map_err(|source| LoadError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok(entry.map(|_| value))
    }
}
