//! Search-result cache (C10, spec §4.8) — caches `similar`/`find` results
//! keyed by a fingerprint of the (normalized) query vector, `k`, and any
//! attribute filter, with an LRU+TTL eviction policy mirroring the tiered
//! entity cache (§4.4) and a blanket invalidation on any mutation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::storage::CacheInvalidation;

/// Vector components are rounded to this many decimal digits before
/// hashing, so near-identical floating point noise still hits the cache.
const FINGERPRINT_PRECISION: i32 = 4;

pub const DEFAULT_MAX_SIZE: usize = 1_000;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// A fingerprint collapses a query into a cache key. Two logically
/// identical queries (same vector up to rounding, same k, same filter)
/// produce the same fingerprint.
fn fingerprint(query: &[f32], k: usize, filter_digest: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    let scale = 10f32.powi(FINGERPRINT_PRECISION);
    for x in query {
        let rounded = (x * scale).round() as i64;
        hasher.update(rounded.to_le_bytes());
    }
    hasher.update(k.to_le_bytes());
    if let Some(digest) = filter_digest {
        hasher.update(digest.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Canonical digest of an attribute filter: sorted key→value pairs, hashed.
/// Any filter expressible this way produces the same digest regardless of
/// the order its predicates were specified in.
pub fn filter_digest(predicates: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in predicates {
        hasher.update(k.as_bytes());
        hasher.update([0u8]);
        hasher.update(v.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

struct Entry {
    results: Vec<(Uuid, f32)>,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
    stats: SearchCacheStats,
}

pub struct SearchResultCache {
    max_size: usize,
    max_age: Duration,
    inner: Mutex<Inner>,
}

impl SearchResultCache {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            max_age,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stats: SearchCacheStats::default(),
            }),
        }
    }

    /// Returns `None` for full-attribute-filter queries the spec excludes
    /// from caching as well as for a genuine miss; callers can't tell the
    /// two apart and shouldn't need to — both mean "go run the search".
    pub fn get(&self, query: &[f32], k: usize, filter_digest: Option<&str>, skip_cache: bool) -> Option<Vec<(Uuid, f32)>> {
        if skip_cache {
            return None;
        }
        let key = fingerprint(query, k, filter_digest);
        let mut inner = self.inner.lock().unwrap();

        let stale = inner
            .entries
            .get(&key)
            .map(|e| e.inserted_at.elapsed() > self.max_age)
            .unwrap_or(false);
        if stale {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
        }

        let found = inner.entries.get(&key).map(|e| e.results.clone());
        if found.is_some() {
            inner.stats.hits += 1;
            if let Some(pos) = inner.order.iter().position(|k| k == &key) {
                inner.order.remove(pos);
            }
            inner.order.push_back(key);
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    pub fn put(&self, query: &[f32], k: usize, filter_digest: Option<&str>, skip_cache: bool, results: Vec<(Uuid, f32)>) {
        if skip_cache {
            return;
        }
        let key = fingerprint(query, k, filter_digest);
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.len() >= self.max_size && !inner.entries.contains_key(&key) {
            if let Some(evict_key) = inner.order.pop_front() {
                inner.entries.remove(&evict_key);
                inner.stats.evictions += 1;
            }
        }
        inner.entries.insert(key.clone(), Entry { results, inserted_at: Instant::now() });
        if let Some(pos) = inner.order.iter().position(|k| k == &key) {
            inner.order.remove(pos);
        }
        inner.order.push_back(key);
    }

    pub fn stats(&self) -> SearchCacheStats {
        let inner = self.inner.lock().unwrap();
        SearchCacheStats { len: inner.entries.len(), ..inner.stats }
    }

    /// Rough resident-set estimate: entry count times an assumed average
    /// payload size, for operators sizing `max_size` against memory budget.
    pub fn estimated_memory_bytes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .values()
            .map(|e| e.results.len() * (std::mem::size_of::<Uuid>() + std::mem::size_of::<f32>()))
            .sum()
    }
}

/// Any mutation invalidates the whole cache (spec §4.8: "no selective
/// invalidation — a write clears everything"). Wired into `StorageEngine`
/// via `set_invalidation_hook`.
impl CacheInvalidation for SearchResultCache {
    fn invalidate_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = SearchResultCache::new(10, Duration::from_secs(60));
        let id = Uuid::new_v4();
        cache.put(&[1.0, 2.0], 5, None, false, vec![(id, 0.1)]);
        let hit = cache.get(&[1.0, 2.0], 5, None, false);
        assert_eq!(hit, Some(vec![(id, 0.1)]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn skip_cache_bypasses_both_read_and_write() {
        let cache = SearchResultCache::new(10, Duration::from_secs(60));
        cache.put(&[1.0], 5, None, true, vec![(Uuid::new_v4(), 0.0)]);
        assert_eq!(cache.get(&[1.0], 5, None, true), None);
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = SearchResultCache::new(10, Duration::from_millis(1));
        cache.put(&[1.0], 5, None, false, vec![(Uuid::new_v4(), 0.0)]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&[1.0], 5, None, false), None);
    }

    #[test]
    fn different_filter_digests_are_different_keys() {
        let cache = SearchResultCache::new(10, Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(&[1.0], 5, Some("digest-a"), false, vec![(a, 0.0)]);
        cache.put(&[1.0], 5, Some("digest-b"), false, vec![(b, 0.0)]);
        assert_eq!(cache.get(&[1.0], 5, Some("digest-a"), false), Some(vec![(a, 0.0)]));
        assert_eq!(cache.get(&[1.0], 5, Some("digest-b"), false), Some(vec![(b, 0.0)]));
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let cache = SearchResultCache::new(10, Duration::from_secs(60));
        cache.put(&[1.0], 5, None, false, vec![(Uuid::new_v4(), 0.0)]);
        cache.invalidate_all();
        assert_eq!(cache.get(&[1.0], 5, None, false), None);
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn eviction_drops_the_oldest_entry_at_capacity() {
        let cache = SearchResultCache::new(1, Duration::from_secs(60));
        cache.put(&[1.0], 5, None, false, vec![(Uuid::new_v4(), 0.0)]);
        cache.put(&[2.0], 5, None, false, vec![(Uuid::new_v4(), 0.0)]);
        assert_eq!(cache.get(&[1.0], 5, None, false), None);
        assert_eq!(cache.stats().evictions, 1);
    }
}
