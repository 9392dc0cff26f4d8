//! Read cache.
//!
//! Entries are keyed by read key, optional id and the canonical encoding of
//! the request parameters, so every parameter variant of a read gets its own
//! entry. Invalidation marks every variant of a read key stale instead of
//! dropping it: the old value stays visible to [`QueryCache::peek`] until the
//! next fetch replaces it.
//!
//! Every invalidation also bumps a per read key generation. A response whose
//! request started before the bump is stored stale, so an in-flight fetch can
//! not undo an invalidation that happened while it was on the wire.
//!
//! - **Concurrent Access**: `DashMap`, shared by every in-flight operation
//! - **Eviction**: idle-based, driven by [`QueryCache::evict_idle`]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use opsdesk_core::QueryParams;
use serde_json::Value;

/// Identity of one cached read result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: String,
    pub id: Option<String>,
    pub params: String,
}

impl CacheKey {
    pub fn new(key: &str, id: Option<&str>, params: &QueryParams) -> Self {
        Self {
            key: key.to_string(),
            id: id.map(str::to_string),
            params: params.canonical(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        if !self.params.is_empty() {
            write!(f, "?{}", self.params)?;
        }
        Ok(())
    }
}

struct CacheEntry {
    value: Value,
    fetched_at: Instant,
    last_access: Instant,
    stale: bool,
    refetch_on_focus: bool,
}

impl CacheEntry {
    fn is_fresh(&self, stale_after: Option<Duration>) -> bool {
        !self.stale && stale_after.is_none_or(|age| self.fetched_at.elapsed() < age)
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub insertions: AtomicU64,
    pub invalidations: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStatistics {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared store of validated read results.
pub struct QueryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    generations: DashMap<String, u64>,
    stats: Arc<CacheStatistics>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("size", &self.entries.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            stats: Arc::new(CacheStatistics::default()),
        }
    }

    /// Cached value if present and fresh. Counts a hit or a miss.
    pub fn get_fresh(&self, key: &CacheKey, stale_after: Option<Duration>) -> Option<Value> {
        let found = self.entries.get_mut(key).and_then(|mut entry| {
            entry.last_access = Instant::now();
            entry.is_fresh(stale_after).then(|| entry.value.clone())
        });

        let counter = if found.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Cached value regardless of staleness, without touching statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        self.entries.get(key).map(|entry| entry.stale)
    }

    /// Invalidation generation of `read_key`; capture it before sending a request.
    pub fn generation(&self, read_key: &str) -> u64 {
        self.generations.get(read_key).map_or(0, |g| *g)
    }

    /// Store a settled result, replacing whatever was there.
    pub fn insert(&self, key: CacheKey, value: Value, refetch_on_focus: bool) {
        self.store(key, value, refetch_on_focus, false);
    }

    /// Store a result fetched under `generation`.
    ///
    /// If the read key was invalidated since, the entry is stored stale and
    /// `false` is returned.
    pub fn insert_settled(
        &self,
        key: CacheKey,
        value: Value,
        refetch_on_focus: bool,
        generation: u64,
    ) -> bool {
        let current = self.generation(&key.key) == generation;
        if !current {
            tracing::debug!(key = %key, "Read key invalidated in flight, storing stale");
        }
        self.store(key, value, refetch_on_focus, !current);
        current
    }

    fn store(&self, key: CacheKey, value: Value, refetch_on_focus: bool, stale: bool) {
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: now,
                last_access: now,
                stale,
                refetch_on_focus,
            },
        );
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark every parameter variant of `read_key` stale. Returns the count.
    pub fn invalidate_key(&self, read_key: &str) -> usize {
        *self.generations.entry(read_key.to_string()).or_insert(0) += 1;

        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().key == read_key {
                entry.stale = true;
                count += 1;
            }
        }
        self.stats
            .invalidations
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(read_key, count, "Invalidated cached reads");
        count
    }

    /// Mark stale every entry whose policy asked for refetch on focus.
    pub fn mark_focus_stale(&self) -> usize {
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.refetch_on_focus && !entry.stale {
                entry.stale = true;
                count += 1;
            }
        }
        count
    }

    /// Drop entries not read for longer than `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_access.elapsed() <= max_idle);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!("Evicted {} idle cache entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        tracing::debug!("Cleared all cache entries");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
