//! Bounded TTL cache for normalised engine results.
//!
//! Eviction happens only on access: reads drop expired entries and promote
//! hits, writes purge everything expired before trimming least recently used
//! entries down to the capacity. There is no background sweeper.

use std::{
    borrow::Borrow,
    fmt,
    hash::Hash,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use lru::LruCache;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// LRU-ordered map whose entries expire after a per-insert TTL.
pub struct BoundedTtlCache<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    max_entries: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> BoundedTtlCache<K, V> {
    /// Create a cache holding at most `max_entries` (at least one).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries: max_entries.max(1),
        }
    }

    /// Return a live entry, promoting it to most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = self.entries.peek(key)?.expires_at <= now;
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, then evict expired and overflow entries.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        self.entries.put(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        self.evict_expired(now);
        while self.entries.len() > self.max_entries {
            self.entries.pop_lru();
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.entries.pop(&key);
        }
    }

    /// Number of stored entries, including any not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Capacity.
    #[must_use]
    pub const fn max_entries(&self) -> usize { self.max_entries }
}

/// Shared cache with a TTL fixed at construction.
pub struct ResultCache<V> {
    inner: Mutex<BoundedTtlCache<String, V>>,
    ttl: Duration,
}

impl<V> fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache with capacity `max_entries` and entry lifetime `ttl`.
    ///
    /// TTLs shorter than one millisecond are raised to one millisecond.
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(BoundedTtlCache::new(max_entries)),
            ttl: ttl.max(Duration::from_millis(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedTtlCache<String, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up a live entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> { self.lock().get(key) }

    /// Store `value` under `key`.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let ttl = self.ttl;
        self.lock().set(key.into(), value, ttl);
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration { self.ttl }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().len() }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}
