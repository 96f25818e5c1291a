//! Built-in metrics augmentation (spec §4.9: priority 90, around) — counts
//! calls and tracks per-operation latency.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;

use super::{Augmentation, Next, Operation, OperationContext, OperationOutcome, OperationSet, Timing};

pub const PRIORITY: i32 = 90;

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationMetrics {
    pub count: u64,
    pub errors: u64,
    pub total_duration: Duration,
}

impl OperationMetrics {
    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

pub struct MetricsAugmentation {
    metrics: Mutex<HashMap<Operation, OperationMetrics>>,
}

impl MetricsAugmentation {
    pub fn new() -> Self {
        Self { metrics: Mutex::new(HashMap::new()) }
    }

    pub fn snapshot(&self) -> HashMap<Operation, OperationMetrics> {
        self.metrics.lock().unwrap().clone()
    }
}

impl Default for MetricsAugmentation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Augmentation for MetricsAugmentation {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn timing(&self) -> Timing {
        Timing::Around
    }

    fn operations(&self) -> OperationSet {
        OperationSet::All
    }

    async fn run_around(&self, ctx: &OperationContext, next: Next) -> Result<OperationOutcome> {
        let started = Instant::now();
        let result = next.call().await;
        let elapsed = started.elapsed();

        let mut metrics = self.metrics.lock().unwrap();
        let entry = metrics.entry(ctx.operation).or_default();
        entry.count += 1;
        entry.total_duration += elapsed;
        if result.is_err() {
            entry.errors += 1;
        }
        drop(metrics);

        result
    }
}
