//! Adaptive backpressure (C5, spec §4.2) — a single process-wide semaphore
//! with dynamic capacity, consumed by every backend call in C6.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::sleep;
use tracing::{debug, warn};

const INITIAL_CAPACITY: usize = 100;
const MIN_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const HIGH_VOLUME_PENDING_THRESHOLD: usize = 20;
const HIGH_VOLUME_COOLDOWN: Duration = Duration::from_secs(1);

/// Outcome of the backend call a permit was guarding, reported at release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Throttled,
    OtherFailure,
}

/// Something that can estimate whether the process is under memory pressure.
/// Spec §4.2 calls this "a heuristic derived from available memory" without
/// pinning it down further; the default source never reports pressure, and a
/// host application can plug in a real one (e.g. backed by `/proc/meminfo` or
/// a platform API) without this crate depending on a specific sysinfo crate.
pub trait MemoryPressureSource: Send + Sync {
    fn under_pressure(&self) -> bool;
}

pub struct NeverUnderPressure;
impl MemoryPressureSource for NeverUnderPressure {
    fn under_pressure(&self) -> bool {
        false
    }
}

pub struct AdmissionControl {
    semaphore: Semaphore,
    capacity: AtomicUsize,
    ceiling: usize,
    consecutive_successes: AtomicU32,
    consecutive_throttles: AtomicU32,
    backoff: Mutex<Duration>,
    high_volume: AtomicBool,
    pending_ops: AtomicUsize,
    override_high_volume: AtomicBool,
    memory_source: Arc<dyn MemoryPressureSource>,
}

impl AdmissionControl {
    pub fn new(ceiling: usize) -> Arc<Self> {
        Self::with_memory_source(ceiling, Arc::new(NeverUnderPressure))
    }

    pub fn with_memory_source(ceiling: usize, memory_source: Arc<dyn MemoryPressureSource>) -> Arc<Self> {
        let capacity = INITIAL_CAPACITY.min(ceiling).max(1);
        let control = Arc::new(Self {
            semaphore: Semaphore::new(capacity),
            capacity: AtomicUsize::new(capacity),
            ceiling,
            consecutive_successes: AtomicU32::new(0),
            consecutive_throttles: AtomicU32::new(0),
            backoff: Mutex::new(MIN_BACKOFF),
            high_volume: AtomicBool::new(false),
            pending_ops: AtomicUsize::new(0),
            override_high_volume: AtomicBool::new(
                std::env::var("BRAINY_FORCE_HIGH_VOLUME")
                    .map(|v| v == "true")
                    .unwrap_or(false),
            ),
            memory_source,
        });
        control
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn high_volume_mode(&self) -> bool {
        self.override_high_volume.load(Ordering::Relaxed) || self.high_volume.load(Ordering::Relaxed)
    }

    /// Acquire one permit, honoring any active backoff window first.
    pub async fn acquire(self: &Arc<Self>) -> AdmissionPermit<'_> {
        let backoff = *self.backoff.lock().unwrap();
        if backoff > MIN_BACKOFF {
            debug!(?backoff, "admission backoff active");
            sleep(backoff).await;
        }

        let pending = self.pending_ops.fetch_add(1, Ordering::Relaxed) + 1;
        if pending > HIGH_VOLUME_PENDING_THRESHOLD {
            self.high_volume.store(true, Ordering::Relaxed);
        }

        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        AdmissionPermit {
            control: self,
            permit: Some(permit),
        }
    }

    fn release(&self, outcome: Outcome) {
        self.pending_ops.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Outcome::Success => {
                self.consecutive_throttles.store(0, Ordering::Relaxed);
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes % 10 == 0 {
                    self.grow_capacity();
                }
                *self.backoff.lock().unwrap() = MIN_BACKOFF;
            }
            Outcome::Throttled => {
                self.consecutive_successes.store(0, Ordering::Relaxed);
                let throttles = self.consecutive_throttles.fetch_add(1, Ordering::Relaxed) + 1;
                self.shrink_capacity(2);
                if throttles >= 3 {
                    self.shrink_capacity(4);
                    let mut backoff = self.backoff.lock().unwrap();
                    *backoff = (*backoff * 2).min(MAX_BACKOFF);
                    warn!(throttles, backoff = ?*backoff, "three consecutive throttles, backing off");
                }
            }
            Outcome::OtherFailure => {
                self.consecutive_successes.store(0, Ordering::Relaxed);
            }
        }
    }

    fn grow_capacity(&self) {
        let current = self.capacity.load(Ordering::Relaxed);
        if current >= self.ceiling {
            return;
        }
        let next = (current + 1).min(self.ceiling);
        self.semaphore.add_permits(next - current);
        self.capacity.store(next, Ordering::Relaxed);
    }

    /// Shrinks capacity to `current / divisor`, never below 1. Uses
    /// `forget_permits` so in-flight callers aren't disturbed; the reduction
    /// is only visible to future `acquire` calls.
    fn shrink_capacity(&self, divisor: usize) {
        let current = self.capacity.load(Ordering::Relaxed);
        let target = (current / divisor).max(1);
        if target >= current {
            return;
        }
        let delta = current - target;
        let forgotten = self.semaphore.forget_permits(delta);
        self.capacity.store(current - forgotten, Ordering::Relaxed);
    }

    /// Periodic memory-pressure check (spec §4.2: every 5s, reduce capacity by
    /// 25% under pressure). Intended to be driven by a background task owned
    /// by the engine that constructs this control.
    pub fn tick_memory_pressure(&self) {
        if self.memory_source.under_pressure() {
            warn!("memory pressure detected, reducing admission capacity by 25%");
            self.shrink_capacity_by_fraction(4);
        }
    }

    fn shrink_capacity_by_fraction(&self, denominator: usize) {
        let current = self.capacity.load(Ordering::Relaxed);
        let reduction = (current / denominator).max(1);
        let target = current.saturating_sub(reduction).max(1);
        if target >= current {
            return;
        }
        let delta = current - target;
        let forgotten = self.semaphore.forget_permits(delta);
        self.capacity.store(current - forgotten, Ordering::Relaxed);
    }

    /// Disengages high-volume mode after the cooldown window, called from the
    /// owning engine's background tick.
    pub fn tick_high_volume_cooldown(&self, pending_below_threshold_since: Duration) {
        if pending_below_threshold_since >= HIGH_VOLUME_COOLDOWN
            && !self.override_high_volume.load(Ordering::Relaxed)
        {
            self.high_volume.store(false, Ordering::Relaxed);
        }
    }
}

/// RAII guard returned by [`AdmissionControl::acquire`]. The caller must call
/// [`AdmissionPermit::release`] with the outcome of the guarded operation;
/// dropping without releasing is treated as `OtherFailure` so a panicking
/// caller doesn't silently inflate the success streak.
pub struct AdmissionPermit<'a> {
    control: &'a AdmissionControl,
    permit: Option<SemaphorePermit<'a>>,
}

impl<'a> AdmissionPermit<'a> {
    pub fn release(mut self, outcome: Outcome) {
        self.permit.take();
        self.control.release(outcome);
    }
}

impl<'a> Drop for AdmissionPermit<'a> {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            self.control.release(Outcome::OtherFailure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_at_initial_capacity_or_ceiling() {
        let control = AdmissionControl::new(50);
        assert_eq!(control.capacity(), 50);
        let control = AdmissionControl::new(1000);
        assert_eq!(control.capacity(), INITIAL_CAPACITY);
    }

    #[tokio::test]
    async fn throttle_halves_capacity() {
        let control = AdmissionControl::new(1000);
        let before = control.capacity();
        let permit = control.acquire().await;
        permit.release(Outcome::Throttled);
        assert!(control.capacity() < before);
    }

    #[tokio::test]
    async fn three_consecutive_throttles_quarter_capacity_and_backoff() {
        let control = AdmissionControl::new(1000);
        for _ in 0..3 {
            let permit = control.acquire().await;
            permit.release(Outcome::Throttled);
        }
        assert!(*control.backoff.lock().unwrap() > MIN_BACKOFF);
    }

    #[tokio::test]
    async fn success_resets_backoff() {
        let control = AdmissionControl::new(1000);
        for _ in 0..3 {
            let permit = control.acquire().await;
            permit.release(Outcome::Throttled);
        }
        let permit = control.acquire().await;
        permit.release(Outcome::Success);
        assert_eq!(*control.backoff.lock().unwrap(), MIN_BACKOFF);
    }

    #[tokio::test]
    async fn high_volume_engages_past_pending_threshold() {
        let control = AdmissionControl::new(1000);
        let mut permits = Vec::new();
        for _ in 0..=HIGH_VOLUME_PENDING_THRESHOLD {
            permits.push(control.acquire().await);
        }
        assert!(control.high_volume_mode());
    }
}
