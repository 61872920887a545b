//! Tagged TTL + LRU cache store
//!
//! Provides a `CacheStore` holding values in memory under string keys. Each
//! entry carries its own TTL and a set of tags. Entries are evicted when the
//! store is full (least recently accessed first) and treated as absent once
//! their TTL has elapsed.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
    hit_count: u64,
    last_accessed_at: Instant,
    /// Logical access clock; breaks ties between equal `last_accessed_at`
    access_seq: u64,
    tags: HashSet<String>,
}

impl<T> CacheEntry<T> {
    /// Visible while `now - created_at <= ttl`
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

#[derive(Debug)]
struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

impl<T> CacheState<T> {
    fn tick(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Removes the entry with the oldest access, returning its key
    fn evict_lru(&mut self) -> Option<String> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq))
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        Some(key)
    }

    /// Looks up a live entry, counting the hit or miss and refreshing recency
    fn lookup(&mut self, key: &str, now: Instant) -> Option<&CacheEntry<T>> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            debug!(key, "cache entry expired on read");
            return None;
        }

        self.hits += 1;
        let seq = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.hit_count += 1;
        entry.last_accessed_at = now;
        entry.access_seq = seq;
        Some(&*entry)
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    /// Capacity before LRU eviction starts
    pub max_size: usize,
    /// Percentage of lookups that hit, 0 when nothing was looked up yet
    pub hit_rate: f64,
    pub oldest_entry_age_ms: Option<u64>,
    pub newest_entry_age_ms: Option<u64>,
}

/// Bounded in-memory key/value store with per-entry TTL and tags
///
/// All operations take the same lock, so eviction, sweeping and promotion on
/// read never interleave. The store itself never fails; `get_or_compute`
/// only propagates errors from its supplier.
#[derive(Debug)]
pub struct CacheStore<T> {
    state: Mutex<CacheState<T>>,
    max_size: usize,
}

impl<T: Clone> CacheStore<T> {
    /// Creates an empty store holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                next_seq: 0,
            }),
            max_size: max_size.max(1),
        }
    }

    /// Lock the state mutex, recovering from poison if necessary.
    ///
    /// A poisoned cache can at worst serve a stale entry or miss one, which
    /// the callers already tolerate.
    fn lock_state(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Cache store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the value for `key` if present and not expired
    ///
    /// Expired entries found here are removed on the spot.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.lookup(key, now).map(|e| e.value.clone())
    }

    /// Like [`get`](Self::get), also returning how old the entry is
    pub fn get_with_age(&self, key: &str) -> Option<(T, Duration)> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state
            .lookup(key, now)
            .map(|e| (e.value.clone(), e.age(now)))
    }

    /// Inserts or overwrites `key`
    ///
    /// When the store is full and `key` is new, the least recently accessed
    /// entry is evicted first.
    pub fn set(&self, key: &str, value: T, ttl: Duration, tags: &[&str]) {
        let now = Instant::now();
        let mut state = self.lock_state();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_size() {
            if let Some(evicted) = state.evict_lru() {
                debug!(evicted = %evicted, "cache full, evicted least recently used entry");
            }
        }

        let seq = state.tick();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
                hit_count: 0,
                last_accessed_at: now,
                access_seq: seq,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        );
    }

    /// Returns the cached value or computes, caches and returns a new one
    ///
    /// The supplier runs without the lock held. Its result is cached only on
    /// success; a failure is returned unchanged and nothing is stored.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        supplier: F,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = supplier().await?;
        self.set(key, value.clone(), ttl, tags);
        Ok(value)
    }

    /// Removes a single entry
    pub fn remove(&self, key: &str) -> bool {
        self.lock_state().entries.remove(key).is_some()
    }

    /// Removes every entry carrying `tag`, returning how many were removed
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut state = self.lock_state();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.tags.contains(tag));
        let removed = before - state.entries.len();
        debug!(tag, removed, "invalidated cache entries by tag");
        removed
    }

    /// Number of live or expired-but-unswept entries carrying `tag`
    pub fn count_by_tag(&self, tag: &str) -> usize {
        self.lock_state()
            .entries
            .values()
            .filter(|e| e.tags.contains(tag))
            .count()
    }

    /// Removes every entry and resets the hit/miss counters
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Removes all entries whose TTL has elapsed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock_state();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired(now));
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters and entry ages
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.lock_state();

        let requests = state.hits + state.misses;
        let hit_rate = if requests == 0 {
            0.0
        } else {
            state.hits as f64 / requests as f64 * 100.0
        };

        let ages = state.entries.values().map(|e| e.age(now).as_millis() as u64);
        let oldest = ages.clone().max();
        let newest = ages.min();

        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            max_size: self.max_size(),
            hit_rate,
            oldest_entry_age_ms: oldest,
            newest_entry_age_ms: newest,
        }
    }

    /// Number of times `key` has been served, if it is cached
    #[cfg(test)]
    fn hit_count(&self, key: &str) -> Option<u64> {
        self.lock_state().entries.get(key).map(|e| e.hit_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_until_ttl_elapses() {
        let cache = CacheStore::new(10);
        cache.set("k", 42, Duration::from_millis(500), &[]);

        assert_eq!(cache.get("k"), Some(42));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cache.get("k"), Some(42), "entry visible at exactly ttl");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0, "expired entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_example() {
        let cache = CacheStore::new(2);
        cache.set("a", 1, MINUTE, &[]);
        cache.set("b", 2, MINUTE, &[]);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3, MINUTE, &[]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_uses_last_access_time() {
        let cache = CacheStore::new(3);
        cache.set("a", 1, MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("b", 2, MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("c", 3, MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(10)).await;

        cache.get("a");
        cache.get("b");
        cache.set("d", 4, MINUTE, &[]);

        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = CacheStore::new(2);
        cache.set("a", 1, MINUTE, &[]);
        cache.set("b", 2, MINUTE, &[]);
        cache.set("a", 10, MINUTE, &[]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_never_exceeds_max() {
        let cache = CacheStore::new(5);
        for i in 0..50 {
            cache.set(&format!("key-{}", i), i, MINUTE, &[]);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.get("key-49"), Some(49));
        assert_eq!(cache.get("key-44"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_caches_success() {
        let cache = CacheStore::new(10);
        let mut calls = 0;

        let first: Result<i32, String> = cache
            .get_or_compute("k", || { calls += 1; async { Ok(7) } }, MINUTE, &["t"])
            .await;
        assert_eq!(first, Ok(7));

        let second: Result<i32, String> = cache
            .get_or_compute("k", || async { Ok(99) }, MINUTE, &["t"])
            .await;
        assert_eq!(second, Ok(7), "second call served from cache");
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_propagates_failure_without_caching() {
        let cache: CacheStore<i32> = CacheStore::new(10);

        let result: Result<i32, String> = cache
            .get_or_compute("k", || async { Err("boom".to_string()) }, MINUTE, &[])
            .await;
        assert_eq!(result, Err("boom".to_string()));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_by_tag() {
        let cache = CacheStore::new(10);
        cache.set("gh:1", 1, MINUTE, &["github", "repositories"]);
        cache.set("gh:2", 2, MINUTE, &["github"]);
        cache.set("hn:1", 3, MINUTE, &["hacker_news"]);

        assert_eq!(cache.count_by_tag("github"), 2);
        assert_eq!(cache.invalidate_by_tag("github"), 2);
        assert_eq!(cache.get("gh:1"), None);
        assert_eq!(cache.get("hn:1"), Some(3));
        assert_eq!(cache.invalidate_by_tag("missing"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = CacheStore::new(10);
        cache.set("short", 1, Duration::from_millis(100), &[]);
        cache.set("long", 2, MINUTE, &[]);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let cache = CacheStore::new(10);
        assert_eq!(cache.stats().hit_rate, 0.0);
        assert_eq!(cache.stats().oldest_entry_age_ms, None);

        cache.set("a", 1, MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(300)).await;
        cache.set("b", 2, MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(100)).await;

        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 10);
        assert!((stats.hit_rate - 75.0).abs() < 0.001);
        assert_eq!(stats.oldest_entry_age_ms, Some(400));
        assert_eq!(stats.newest_entry_age_ms, Some(100));
        assert_eq!(cache.hit_count("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_with_age() {
        let cache = CacheStore::new(10);
        cache.set("a", "x", MINUTE, &[]);
        tokio::time::advance(Duration::from_millis(250)).await;

        let (value, age) = cache.get_with_age("a").unwrap();
        assert_eq!(value, "x");
        assert_eq!(age, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_everything() {
        let cache = CacheStore::new(10);
        cache.set("a", 1, MINUTE, &[]);
        cache.get("a");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }
}
