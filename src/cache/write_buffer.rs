//! Write buffer — the write side of C4 (spec §4.3). One instance per
//! (backend, entity-kind) pair, as the spec requires; the storage engine owns
//! one for nouns and one for verbs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_SIZE_THRESHOLD: usize = 64;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(200);

struct Buffered<T> {
    item: T,
    buffered_at: Instant,
}

/// Coalesces writes to the same id (last write wins) and reports when it's
/// time to flush, by size or by age, without owning the flush mechanics
/// itself — the storage engine drives the actual backend write.
pub struct WriteBuffer<T> {
    pending: Mutex<HashMap<Uuid, Buffered<T>>>,
    size_threshold: usize,
    max_delay: Duration,
}

impl<T: Clone> WriteBuffer<T> {
    pub fn new(size_threshold: usize, max_delay: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            size_threshold,
            max_delay,
        }
    }

    /// Replaces an already-buffered item with the same id, or appends.
    pub fn add(&self, id: Uuid, item: T) {
        let mut guard = self.pending.lock().unwrap();
        guard.insert(
            id,
            Buffered {
                item,
                buffered_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the buffer exceeds its size threshold or its oldest pending
    /// item has aged past `max_delay` (spec §4.3 flush conditions (a), (b)).
    pub fn should_flush(&self) -> bool {
        let guard = self.pending.lock().unwrap();
        if guard.len() >= self.size_threshold {
            return true;
        }
        guard
            .values()
            .map(|b| b.buffered_at.elapsed())
            .any(|age| age >= self.max_delay)
    }

    /// Drains everything currently buffered for a flush attempt. The caller
    /// is responsible for calling [`WriteBuffer::readd_failed`] for any item
    /// whose backend write did not succeed.
    pub fn drain_all(&self) -> Vec<(Uuid, T)> {
        let mut guard = self.pending.lock().unwrap();
        guard.drain().map(|(id, b)| (id, b.item)).collect()
    }

    /// Puts failed items back, but only if nothing newer has been written for
    /// that id in the meantime (at-most-once-per-flush, last-write-wins, per
    /// spec §4.3's ordering guarantee).
    pub fn readd_failed(&self, items: Vec<(Uuid, T)>) {
        let mut guard = self.pending.lock().unwrap();
        for (id, item) in items {
            guard.entry(id).or_insert_with(|| Buffered {
                item,
                buffered_at: Instant::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_write_to_same_id_replaces_first() {
        let buf: WriteBuffer<i32> = WriteBuffer::new(DEFAULT_SIZE_THRESHOLD, DEFAULT_MAX_DELAY);
        let id = Uuid::new_v4();
        buf.add(id, 1);
        buf.add(id, 2);
        assert_eq!(buf.len(), 1);
        let drained = buf.drain_all();
        assert_eq!(drained, vec![(id, 2)]);
    }

    #[test]
    fn flush_triggers_on_size_threshold() {
        let buf: WriteBuffer<i32> = WriteBuffer::new(2, Duration::from_secs(3600));
        buf.add(Uuid::new_v4(), 1);
        assert!(!buf.should_flush());
        buf.add(Uuid::new_v4(), 2);
        assert!(buf.should_flush());
    }

    #[test]
    fn flush_triggers_on_age() {
        let buf: WriteBuffer<i32> = WriteBuffer::new(1000, Duration::from_millis(1));
        buf.add(Uuid::new_v4(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(buf.should_flush());
    }

    #[test]
    fn readd_failed_does_not_clobber_newer_write() {
        let buf: WriteBuffer<i32> = WriteBuffer::new(DEFAULT_SIZE_THRESHOLD, DEFAULT_MAX_DELAY);
        let id = Uuid::new_v4();
        buf.add(id, 1);
        let drained = buf.drain_all();
        buf.add(id, 2); // a newer write races in before the failed retry lands
        buf.readd_failed(drained);
        let final_drain = buf.drain_all();
        assert_eq!(final_drain, vec![(id, 2)]);
    }
}
