//! TTL cache storage.

use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// In-memory key/value cache with a fixed time-to-live.
///
/// There is no size bound and no background sweep: an expired entry stays in
/// memory until the next lookup of its key (or an invalidation) removes it.
pub struct CacheStore {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key` if it is younger than the TTL.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let ttl = self.ttl;

        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(ttl, now))
            .map(|entry| entry.value.clone());
        if fresh.is_some() {
            counter!("pressroom_cache_hit_total").increment(1);
            return fresh;
        }

        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_fresh(ttl, now))
            .is_some()
        {
            counter!("pressroom_cache_expired_total").increment(1);
            debug!(target = SOURCE, key, "evicted expired cache entry");
        }

        counter!("pressroom_cache_miss_total").increment(1);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove every entry whose key contains `pattern`, or everything when
    /// `pattern` is `None`. Returns the number of removed entries.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            Some(pattern) => self.entries.retain(|key, _| !key.contains(pattern)),
            None => self.entries.clear(),
        }
        let removed = before.saturating_sub(self.entries.len());
        debug!(target = SOURCE, pattern, removed, "invalidated cache entries");
        removed
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
