//! Content-addressed translation cache.
//!
//! Two users posting the same sentence into different channels share one
//! external translation call: entries are keyed by
//! `sha256(normalize(content)) + ":" + target_language`, where normalize is
//! trim → collapse whitespace → lowercase.  Normalization exists only to
//! form keys; the translator always receives the original text.
//!
//! The cache is advisory: the pipeline behaves identically (just slower)
//! with [`NoopCache`], which never stores anything.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use dashmap::DashMap;
use ring::digest;
use tracing::debug;

use crate::lang::Language;

/// Fixed accounting overhead per entry, on top of key and value bytes.
const ENTRY_OVERHEAD_BYTES: usize = 64;

// ── keys ─────────────────────────────────────────────────────────────

/// Collapse whitespace, trim, and lowercase — cache-key form only.
pub fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The cache key for a `(content, target)` pair.
pub fn cache_key(content: &str, target: Language) -> String {
    let hash = digest::digest(&digest::SHA256, normalize(content).as_bytes());
    format!("{}:{}", BASE64.encode(hash.as_ref()), target.as_code())
}

// ── stats ────────────────────────────────────────────────────────────

/// Point-in-time view of cache effectiveness.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total lookups that returned a live value.
    pub hits: u64,
    /// Total lookups that found nothing (or an expired entry).
    pub misses: u64,
    /// Current number of live entries.
    pub entries: usize,
    /// Estimated bytes held (keys + values + fixed per-entry overhead).
    pub memory_bytes: usize,
    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hits={} misses={} entries={} mem={}B rate={:.2}%",
            self.hits,
            self.misses,
            self.entries,
            self.memory_bytes,
            self.hit_rate * 100.0,
        )
    }
}

// ── trait ────────────────────────────────────────────────────────────

/// The cache seam the orchestrator talks to.
///
/// Operations are synchronous; implementations must be safe under
/// concurrent callers and must never return an expired value.
pub trait TranslationCache: Send + Sync {
    /// Look up a cached translation.  Touches access stats on hit.
    fn get(&self, key: &str) -> Option<String>;

    /// Insert or replace a translation.
    fn set(&self, key: &str, value: String);

    /// Remove all entries older than the TTL; returns how many were removed.
    fn cleanup(&self) -> usize;

    /// Drop every entry and reset statistics.
    fn clear(&self);

    /// Current statistics.
    fn stats(&self) -> CacheStatsSnapshot;
}

// ── in-memory implementation ─────────────────────────────────────────

struct CacheEntry {
    value: String,
    inserted_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
}

/// Bounded in-memory cache with TTL expiry and least-recently-accessed
/// eviction.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    memory_bytes: AtomicUsize,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` values for `ttl` each.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            memory_bytes: AtomicUsize::new(0),
        }
    }

    /// The byte cost attributed to one entry.
    fn entry_cost(key: &str, value: &str) -> usize {
        key.len() + value.len() + ENTRY_OVERHEAD_BYTES
    }

    /// Evict the entry with the oldest `last_accessed_at`.
    fn evict_least_recently_accessed(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_accessed_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            if let Some((key, entry)) = self.entries.remove(&key) {
                self.memory_bytes
                    .fetch_sub(Self::entry_cost(&key, &entry.value), Ordering::Relaxed);
                debug!(key = %key, "cache evicted (lru)");
            }
        }
    }
}

impl TranslationCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        // Expiry is checked under the shard lock, so a racing insert can
        // never make an expired value visible.
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.inserted_at.elapsed() > self.ttl {
                drop(entry);
                // remove_if so a racing fresh insert is never discarded.
                let ttl = self.ttl;
                if let Some((key, stale)) = self
                    .entries
                    .remove_if(key, |_, e| e.inserted_at.elapsed() > ttl)
                {
                    self.memory_bytes
                        .fetch_sub(Self::entry_cost(&key, &stale.value), Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_accessed_at = Instant::now();
            entry.access_count += 1;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn set(&self, key: &str, value: String) {
        if self.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_least_recently_accessed();
        }

        let now = Instant::now();
        let cost = Self::entry_cost(key, &value);
        let previous = self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
        if let Some(previous) = previous {
            self.memory_bytes
                .fetch_sub(Self::entry_cost(key, &previous.value), Ordering::Relaxed);
        }
        self.memory_bytes.fetch_add(cost, Ordering::Relaxed);
    }

    fn cleanup(&self) -> usize {
        let before = self.entries.len();
        let mut freed = 0usize;
        self.entries.retain(|key, entry| {
            let live = entry.inserted_at.elapsed() <= self.ttl;
            if !live {
                freed += Self::entry_cost(key, &entry.value);
            }
            live
        });
        self.memory_bytes.fetch_sub(freed, Ordering::Relaxed);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "cache cleanup removed expired entries");
        }
        removed
    }

    fn clear(&self) {
        self.entries.clear();
        self.memory_bytes.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            entries: self.entries.len(),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

// ── noop implementation ──────────────────────────────────────────────

/// A cache that never stores anything.  Exists to prove (and test) that
/// the pipeline treats caching as purely advisory.
pub struct NoopCache;

impl TranslationCache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String) {}

    fn cleanup(&self) -> usize {
        0
    }

    fn clear(&self) {}

    fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: 0,
            misses: 0,
            entries: 0,
            memory_bytes: 0,
            hit_rate: 0.0,
        }
    }
}

// ── periodic cleanup ─────────────────────────────────────────────────

/// Spawn a background task sweeping expired entries every `interval`.
///
/// Abort the returned handle during shutdown.
pub fn spawn_cleanup(
    cache: std::sync::Arc<dyn TranslationCache>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                debug!(removed, "periodic cache cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn cache() -> MemoryCache {
        MemoryCache::new(100, Duration::from_secs(60))
    }

    #[test]
    fn normalize_trims_collapses_lowercases() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
        assert_eq!(normalize("a\t\nb"), "a b");
    }

    #[test]
    fn same_content_same_key_per_target() {
        let a = cache_key("Hello World", Language::Fr);
        let b = cache_key("  hello   world ", Language::Fr);
        assert_eq!(a, b);
        let c = cache_key("Hello World", Language::Es);
        assert_ne!(a, c);
    }

    #[test]
    fn set_then_get() {
        let c = cache();
        c.set("k", "bonjour".into());
        assert_eq!(c.get("k"), Some("bonjour".into()));
    }

    #[test]
    fn miss_returns_none_and_counts() {
        let c = cache();
        assert_eq!(c.get("absent"), None);
        let stats = c.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let c = MemoryCache::new(10, Duration::ZERO);
        c.set("k", "v".into());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.get("k"), None);
        assert_eq!(c.stats().entries, 0);
    }

    #[test]
    fn cleanup_returns_expired_count() {
        let c = MemoryCache::new(10, Duration::ZERO);
        c.set("a", "1".into());
        c.set("b", "2".into());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.cleanup(), 2);
        assert_eq!(c.stats().entries, 0);
        assert_eq!(c.stats().memory_bytes, 0);
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let c = MemoryCache::new(2, Duration::from_secs(60));
        c.set("old", "1".into());
        std::thread::sleep(Duration::from_millis(5));
        c.set("new", "2".into());
        std::thread::sleep(Duration::from_millis(5));
        // Touch "old" so "new" becomes the least recently accessed.
        let _ = c.get("old");
        c.set("extra", "3".into());
        assert_eq!(c.get("old"), Some("1".into()));
        assert_eq!(c.get("new"), None);
        assert_eq!(c.get("extra"), Some("3".into()));
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let c = MemoryCache::new(2, Duration::from_secs(60));
        c.set("a", "1".into());
        c.set("b", "2".into());
        c.set("a", "one".into());
        assert_eq!(c.stats().entries, 2);
        assert_eq!(c.get("a"), Some("one".into()));
        assert_eq!(c.get("b"), Some("2".into()));
    }

    #[test]
    fn memory_accounting_tracks_inserts_and_removals() {
        let c = cache();
        c.set("key", "value".into());
        let expected = "key".len() + "value".len() + ENTRY_OVERHEAD_BYTES;
        assert_eq!(c.stats().memory_bytes, expected);
        c.clear();
        assert_eq!(c.stats().memory_bytes, 0);
    }

    #[test]
    fn hit_rate_monotone_for_repeated_gets() {
        let c = cache();
        c.set("k", "v".into());
        let _ = c.get("missing");
        let mut last_rate = c.stats().hit_rate;
        for _ in 0..5 {
            let _ = c.get("k");
            let rate = c.stats().hit_rate;
            assert!(rate >= last_rate);
            last_rate = rate;
        }
    }

    #[test]
    fn clear_resets_stats() {
        let c = cache();
        c.set("k", "v".into());
        let _ = c.get("k");
        let _ = c.get("nope");
        c.clear();
        let stats = c.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn noop_cache_never_stores() {
        let c = NoopCache;
        c.set("k", "v".into());
        assert_eq!(c.get("k"), None);
        assert_eq!(c.cleanup(), 0);
    }

    #[test]
    fn concurrent_access_keeps_counts_consistent() {
        let c = Arc::new(cache());
        c.set("shared", "v".into());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&c);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    assert_eq!(c.get("shared"), Some("v".into()));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(c.stats().hits, 800);
    }

    #[tokio::test]
    async fn cleanup_task_sweeps() {
        let c: Arc<dyn TranslationCache> =
            Arc::new(MemoryCache::new(10, Duration::from_millis(1)));
        c.set("k", "v".into());
        let handle = spawn_cleanup(Arc::clone(&c), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(c.stats().entries, 0);
    }
}
