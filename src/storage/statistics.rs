//! In-memory statistics tracker (spec §3, §4.1): atomic counters kept live on
//! every mutation, flushed to `_system/statistics.json` opportunistically
//! (min 5s between flushes, max 30s lag).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::Statistics;

pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_FLUSH_LAG: Duration = Duration::from_secs(30);

pub struct StatisticsTracker {
    total_noun_count: AtomicU64,
    total_verb_count: AtomicU64,
    noun_counts_by_type: Mutex<HashMap<String, u64>>,
    verb_counts_by_type: Mutex<HashMap<String, u64>>,
    field_catalog: Mutex<Vec<String>>,
    hnsw_index_size: AtomicU64,
    last_flushed_at: Mutex<Instant>,
    dirty_since: Mutex<Option<Instant>>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self {
            total_noun_count: AtomicU64::new(0),
            total_verb_count: AtomicU64::new(0),
            noun_counts_by_type: Mutex::new(HashMap::new()),
            verb_counts_by_type: Mutex::new(HashMap::new()),
            field_catalog: Mutex::new(Vec::new()),
            hnsw_index_size: AtomicU64::new(0),
            last_flushed_at: Mutex::new(Instant::now()),
            dirty_since: Mutex::new(None),
        }
    }

    pub fn from_snapshot(stats: Statistics) -> Self {
        let tracker = Self::new();
        tracker
            .total_noun_count
            .store(stats.total_noun_count, Ordering::Relaxed);
        tracker
            .total_verb_count
            .store(stats.total_verb_count, Ordering::Relaxed);
        *tracker.noun_counts_by_type.lock().unwrap() = stats.noun_counts_by_type;
        *tracker.verb_counts_by_type.lock().unwrap() = stats.verb_counts_by_type;
        *tracker.field_catalog.lock().unwrap() = stats.field_catalog;
        tracker
            .hnsw_index_size
            .store(stats.hnsw_index_size, Ordering::Relaxed);
        tracker
    }

    fn mark_dirty(&self) {
        let mut dirty = self.dirty_since.lock().unwrap();
        if dirty.is_none() {
            *dirty = Some(Instant::now());
        }
    }

    pub fn increment_noun(&self, type_tag: &str) {
        self.total_noun_count.fetch_add(1, Ordering::Relaxed);
        let mut map = self.noun_counts_by_type.lock().unwrap();
        *map.entry(type_tag.to_string()).or_insert(0) += 1;
        self.mark_dirty();
    }

    pub fn decrement_noun(&self, type_tag: &str) {
        self.total_noun_count.fetch_sub(1, Ordering::Relaxed);
        let mut map = self.noun_counts_by_type.lock().unwrap();
        if let Some(count) = map.get_mut(type_tag) {
            *count = count.saturating_sub(1);
        }
        self.mark_dirty();
    }

    pub fn increment_verb(&self, type_tag: &str) {
        self.total_verb_count.fetch_add(1, Ordering::Relaxed);
        let mut map = self.verb_counts_by_type.lock().unwrap();
        *map.entry(type_tag.to_string()).or_insert(0) += 1;
        self.mark_dirty();
    }

    pub fn decrement_verb(&self, type_tag: &str) {
        self.total_verb_count.fetch_sub(1, Ordering::Relaxed);
        let mut map = self.verb_counts_by_type.lock().unwrap();
        if let Some(count) = map.get_mut(type_tag) {
            *count = count.saturating_sub(1);
        }
        self.mark_dirty();
    }

    pub fn note_field(&self, field: &str) {
        let mut catalog = self.field_catalog.lock().unwrap();
        if !catalog.iter().any(|f| f == field) {
            catalog.push(field.to_string());
            self.mark_dirty();
        }
    }

    pub fn set_hnsw_index_size(&self, size: u64) {
        self.hnsw_index_size.store(size, Ordering::Relaxed);
        self.mark_dirty();
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total_noun_count: self.total_noun_count.load(Ordering::Relaxed),
            total_verb_count: self.total_verb_count.load(Ordering::Relaxed),
            noun_counts_by_type: self.noun_counts_by_type.lock().unwrap().clone(),
            verb_counts_by_type: self.verb_counts_by_type.lock().unwrap().clone(),
            field_catalog: self.field_catalog.lock().unwrap().clone(),
            hnsw_index_size: self.hnsw_index_size.load(Ordering::Relaxed),
        }
    }

    /// True once a flush is both allowed (past `MIN_FLUSH_INTERVAL` since the
    /// last one) and either requested or overdue (past `MAX_FLUSH_LAG` since
    /// going dirty).
    pub fn should_flush(&self) -> bool {
        let dirty_since = *self.dirty_since.lock().unwrap();
        let Some(dirty_since) = dirty_since else {
            return false;
        };
        let since_last_flush = self.last_flushed_at.lock().unwrap().elapsed();
        if since_last_flush < MIN_FLUSH_INTERVAL {
            return false;
        }
        dirty_since.elapsed() >= Duration::ZERO
    }

    pub fn overdue(&self) -> bool {
        self.dirty_since
            .lock()
            .unwrap()
            .map(|since| since.elapsed() >= MAX_FLUSH_LAG)
            .unwrap_or(false)
    }

    pub fn mark_flushed(&self) {
        *self.last_flushed_at.lock().unwrap() = Instant::now();
        *self.dirty_since.lock().unwrap() = None;
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_decrement_noun_updates_totals_and_per_type() {
        let tracker = StatisticsTracker::new();
        tracker.increment_noun("person");
        tracker.increment_noun("person");
        tracker.decrement_noun("person");
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_noun_count, 1);
        assert_eq!(snapshot.noun_counts_by_type.get("person"), Some(&1));
    }

    #[test]
    fn should_flush_is_false_until_dirty() {
        let tracker = StatisticsTracker::new();
        assert!(!tracker.should_flush());
    }

    #[test]
    fn mark_flushed_resets_dirty_state() {
        let tracker = StatisticsTracker::new();
        tracker.increment_verb("owns");
        tracker.mark_flushed();
        assert!(!tracker.overdue());
    }

    #[test]
    fn from_snapshot_round_trips() {
        let tracker = StatisticsTracker::new();
        tracker.increment_noun("document");
        tracker.set_hnsw_index_size(10);
        let snapshot = tracker.snapshot();
        let restored = StatisticsTracker::from_snapshot(snapshot.clone());
        assert_eq!(restored.snapshot().total_noun_count, snapshot.total_noun_count);
        assert_eq!(restored.snapshot().hnsw_index_size, 10);
    }
}
