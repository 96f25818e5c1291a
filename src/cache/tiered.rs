//! Multi-tier cache (C3, spec §4.4) — a small "hot" LRU backed by a larger
//! "warm" LRU. Entries carry an insertion timestamp; anything older than
//! `max_age` is treated as a miss without being evicted early by a sweep.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A single LRU ring: a map for O(1) lookup plus a recency queue. Eviction
/// from `warm` never touches the backend — it's a pure in-memory drop.
struct LruRing<V> {
    capacity: usize,
    entries: HashMap<Uuid, Entry<V>>,
    order: VecDeque<Uuid>,
}

impl<V: Clone> LruRing<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn touch(&mut self, id: &Uuid) {
        if let Some(pos) = self.order.iter().position(|x| x == id) {
            self.order.remove(pos);
        }
        self.order.push_back(*id);
    }

    fn get(&mut self, id: &Uuid, max_age: Duration) -> Option<V> {
        let stale = self
            .entries
            .get(id)
            .map(|e| e.inserted_at.elapsed() > max_age)
            .unwrap_or(false);
        if stale {
            self.entries.remove(id);
            self.order.retain(|x| x != id);
            return None;
        }
        let value = self.entries.get(id).map(|e| e.value.clone());
        if value.is_some() {
            self.touch(id);
        }
        value
    }

    /// Inserts, evicting the least-recently-used entry if at capacity.
    /// Returns the evicted `(id, value)` pair, if any, so the caller can
    /// demote it to the next tier down.
    fn insert(&mut self, id: Uuid, value: V) -> Option<(Uuid, V)> {
        let evicted = if self.entries.len() >= self.capacity && !self.entries.contains_key(&id) {
            self.order.pop_front().and_then(|evict_id| {
                self.entries
                    .remove(&evict_id)
                    .map(|e| (evict_id, e.value))
            })
        } else {
            None
        };
        self.entries.insert(
            id,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.touch(&id);
        evicted
    }

    fn remove(&mut self, id: &Uuid) {
        self.entries.remove(id);
        self.order.retain(|x| x != id);
    }

    fn sweep_expired(&mut self, max_age: Duration) -> usize {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > max_age)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired.len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Two-tier LRU over any `Clone`-able entity (nouns or verbs).
pub struct TieredCache<V> {
    hot: LruRing<V>,
    warm: LruRing<V>,
    max_age: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TieredCacheStats {
    pub hot_len: usize,
    pub warm_len: usize,
}

impl<V: Clone> TieredCache<V> {
    pub fn new(hot_max: usize, warm_max: usize, max_age: Duration) -> Self {
        Self {
            hot: LruRing::new(hot_max),
            warm: LruRing::new(warm_max),
            max_age,
        }
    }

    pub fn get(&mut self, id: &Uuid) -> Option<V> {
        if let Some(v) = self.hot.get(id, self.max_age) {
            return Some(v);
        }
        if let Some(v) = self.warm.get(id, self.max_age) {
            // Promote on access; demote whatever hot evicts back into warm.
            if let Some((evicted_id, evicted_v)) = self.hot.insert(*id, v.clone()) {
                self.warm.insert(evicted_id, evicted_v);
            }
            return Some(v);
        }
        None
    }

    /// Direct insert, as done by a cache-populating write-through. Goes to
    /// hot first; if hot is full the eviction cascades into warm.
    pub fn insert(&mut self, id: Uuid, value: V) {
        if let Some((evicted_id, evicted_v)) = self.hot.insert(id, value) {
            self.warm.insert(evicted_id, evicted_v);
        }
    }

    pub fn remove(&mut self, id: &Uuid) {
        self.hot.remove(id);
        self.warm.remove(id);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.hot.contains(id) || self.warm.contains(id)
    }

    /// Background sweep entry point (spec §4.4: "a background tick sweeps
    /// expired entries"). Returns the number of entries actually evicted.
    pub fn sweep_expired(&mut self) -> usize {
        self.hot.sweep_expired(self.max_age) + self.warm.sweep_expired(self.max_age)
    }

    pub fn stats(&self) -> TieredCacheStats {
        TieredCacheStats {
            hot_len: self.hot.len(),
            warm_len: self.warm.len(),
        }
    }
}

/// Predictive prefetch (spec §4.4, optional): given ids already in view and
/// their known HNSW neighbors, picks up to `prefetch_size` neighbor ids not
/// already cached, to be fetched asynchronously through the coalescer.
pub fn prefetch_candidates<V>(
    cache: &TieredCache<V>,
    current_ids: &[Uuid],
    neighbors_in_memory: &HashMap<Uuid, Vec<Uuid>>,
    prefetch_size: usize,
) -> Vec<Uuid>
where
    V: Clone,
{
    let mut seen: std::collections::HashSet<Uuid> = current_ids.iter().copied().collect();
    let mut out = Vec::new();
    for id in current_ids {
        let Some(neighbors) = neighbors_in_memory.get(id) else {
            continue;
        };
        for &n in neighbors {
            if out.len() >= prefetch_size {
                return out;
            }
            if seen.insert(n) && !cache.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_eviction_demotes_to_warm() {
        let mut cache: TieredCache<i32> = TieredCache::new(2, 4, Duration::from_secs(60));
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        cache.insert(a, 1);
        cache.insert(b, 2);
        cache.insert(c, 3); // evicts `a` from hot into warm

        assert_eq!(cache.get(&a), Some(1));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn expired_entries_are_treated_as_miss() {
        let mut cache: TieredCache<i32> = TieredCache::new(4, 4, Duration::from_millis(1));
        let id = Uuid::new_v4();
        cache.insert(id, 42);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn sweep_removes_expired_without_access() {
        let mut cache: TieredCache<i32> = TieredCache::new(4, 4, Duration::from_millis(1));
        let id = Uuid::new_v4();
        cache.insert(id, 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.stats().hot_len, 0);
    }

    #[test]
    fn prefetch_skips_cached_and_respects_budget() {
        let mut cache: TieredCache<i32> = TieredCache::new(4, 4, Duration::from_secs(60));
        let seed = Uuid::new_v4();
        let (n1, n2, n3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        cache.insert(n1, 1);

        let mut neighbors = HashMap::new();
        neighbors.insert(seed, vec![n1, n2, n3]);

        let candidates = prefetch_candidates(&cache, &[seed], &neighbors, 1);
        assert_eq!(candidates, vec![n2]);
    }
}
