//! In-process counter store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::store::CounterStore;
use crate::error::{Result, WindowGateError};

/// Increments between sweeps of expired counters.
const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

/// A single window counter.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    /// Hits recorded in this window
    count: u64,
    /// When the store forgets this counter
    expires_at: Instant,
}

impl WindowCounter {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A [`CounterStore`] held in process memory.
///
/// Behaves like the shared store for a single process: each key is updated
/// under its shard lock, expiry is armed on the first hit only, and an expired
/// key reads as if it never existed.
///
/// Expired counters are swept out every `sweep_interval` increments, so keys
/// that are never hit again do not accumulate.
#[derive(Debug)]
pub struct MemoryStore {
    counters: DashMap<String, WindowCounter>,
    /// Increments since the store was created
    increments: AtomicU64,
    sweep_interval: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sweeps expired counters every `interval`
    /// increments (at least every increment).
    pub fn with_sweep_interval(interval: u64) -> Self {
        Self {
            counters: DashMap::new(),
            increments: AtomicU64::new(0),
            sweep_interval: interval.max(1),
        }
    }

    /// Drop every expired counter.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        debug!(
            removed = before.saturating_sub(self.counters.len()),
            "Purged expired counters"
        );
    }

    /// Number of counters currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the store holds no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    fn live(&self, key: &str) -> Option<WindowCounter> {
        let now = Instant::now();
        self.counters
            .get(key)
            .map(|counter| *counter)
            .filter(|counter| !counter.is_expired(now))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(window_secs))
            .ok_or_else(|| {
                WindowGateError::Config(format!("time window of {}s is out of range", window_secs))
            })?;

        let mut counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                expires_at,
            });

        if counter.is_expired(now) {
            // Same as the key having been deleted: the next hit opens a new window
            counter.count = 0;
            counter.expires_at = expires_at;
        }

        counter.count += 1;
        let count = counter.count;
        drop(counter);

        trace!(key = %key, count = count, "Incremented counter");

        // The entry guard is released above; retain needs every shard lock
        let hits = self.increments.fetch_add(1, Ordering::Relaxed) + 1;
        if hits % self.sweep_interval == 0 {
            self.purge_expired();
        }
        Ok(count)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        Ok(self.live(key).map(|c| c.count).unwrap_or(0))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .map(|c| c.expires_at.saturating_duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_creates_counter() {
        let store = MemoryStore::new();

        assert_eq!(store.increment("k", 60).await.unwrap(), 1);
        assert_eq!(store.count("k").await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_is_sequential_within_window() {
        let store = MemoryStore::new();

        for expected in 1..=5 {
            assert_eq!(store.increment("k", 60).await.unwrap(), expected);
        }
        assert_eq!(store.count("k").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_absent_key_reads_as_zero() {
        let store = MemoryStore::new();

        assert_eq!(store.count("missing").await.unwrap(), 0);
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry_not_rearmed_by_later_hits() {
        let store = MemoryStore::new();

        store.increment("k", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        store.increment("k", 1).await.unwrap();

        // A re-armed expiry would leave close to a full second
        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_millis(400), "ttl was {:?}", ttl);
    }

    #[tokio::test]
    async fn test_expired_counter_restarts_at_one() {
        let store = MemoryStore::new();

        store.increment("k", 1).await.unwrap();
        store.increment("k", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.count("k").await.unwrap(), 0);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.increment("k", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_counters_swept_during_increments() {
        let store = MemoryStore::with_sweep_interval(50);

        for i in 0..40 {
            store.increment(&format!("client-{}", i), 1).await.unwrap();
        }
        assert_eq!(store.len(), 40);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        // The 50th increment triggers a sweep of the 40 stale counters
        for _ in 0..10 {
            store.increment("fresh", 60).await.unwrap();
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.count("fresh").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_out_of_range_window_is_an_error() {
        let store = MemoryStore::new();

        let result = store.increment("k", u64::MAX).await;
        assert!(matches!(result, Err(WindowGateError::Config(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();

        store.increment("short", 1).await.unwrap();
        store.increment("long", 60).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert_eq!(store.count("long").await.unwrap(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
