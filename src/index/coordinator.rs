//! Scaled search coordinator (C9, spec §4.7) — picks an HNSW/partition
//! configuration from the estimated corpus size and dispatches queries
//! through one of several search strategies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::distance::DistanceMetric;

use super::hnsw::HnswConfig;
use super::partition::{PartitionStrategy, PartitionedIndex};

/// One row of the scale-preset table (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct ScalePreset {
    pub max_nodes_per_partition: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub hot_cache_size: usize,
    pub warm_cache_size: usize,
    pub max_concurrent_partition_searches: usize,
}

const PRESET_SMALL: ScalePreset = ScalePreset {
    max_nodes_per_partition: 10_000,
    m: 16,
    ef_construction: 200,
    ef_search: 50,
    hot_cache_size: 1_000,
    warm_cache_size: 5_000,
    max_concurrent_partition_searches: 4,
};
const PRESET_MEDIUM: ScalePreset = ScalePreset {
    max_nodes_per_partition: 25_000,
    m: 24,
    ef_construction: 300,
    ef_search: 75,
    hot_cache_size: 2_000,
    warm_cache_size: 15_000,
    max_concurrent_partition_searches: 8,
};
const PRESET_LARGE: ScalePreset = ScalePreset {
    max_nodes_per_partition: 50_000,
    m: 32,
    ef_construction: 400,
    ef_search: 100,
    hot_cache_size: 5_000,
    warm_cache_size: 25_000,
    max_concurrent_partition_searches: 12,
};
const PRESET_HUGE: ScalePreset = ScalePreset {
    max_nodes_per_partition: 100_000,
    m: 48,
    ef_construction: 500,
    ef_search: 150,
    hot_cache_size: 10_000,
    warm_cache_size: 50_000,
    max_concurrent_partition_searches: 20,
};

pub fn preset_for_scale(estimated_total_nodes: u64) -> ScalePreset {
    if estimated_total_nodes <= 10_000 {
        PRESET_SMALL
    } else if estimated_total_nodes <= 100_000 {
        PRESET_MEDIUM
    } else if estimated_total_nodes <= 1_000_000 {
        PRESET_LARGE
    } else {
        PRESET_HUGE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Pick a strategy from partition count and recent latency.
    Adaptive,
    /// Search every partition.
    Exhaustive,
    /// Beam search across the top-scoring few partitions only.
    Beam,
    /// Search a random subset of partitions (fixed fraction).
    RandomSubset,
}

/// Rolling average of the last `WINDOW` search durations, in microseconds.
struct RollingLatency {
    samples: Mutex<Vec<u64>>,
}

const WINDOW: usize = 50;

impl RollingLatency {
    fn new() -> Self {
        Self { samples: Mutex::new(Vec::with_capacity(WINDOW)) }
    }

    fn record(&self, micros: u64) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() == WINDOW {
            samples.remove(0);
        }
        samples.push(micros);
    }

    fn average(&self) -> u64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0;
        }
        samples.iter().sum::<u64>() / samples.len() as u64
    }
}

/// Owns the partitioned HNSW index for one noun type (or the default
/// collection) and dispatches searches through a scale-appropriate strategy.
pub struct ScaledSearchCoordinator {
    preset: ScalePreset,
    index: PartitionedIndex,
    latency: RollingLatency,
    searches_run: AtomicU64,
}

impl ScaledSearchCoordinator {
    pub fn new(strategy: PartitionStrategy, dimension: usize, metric: DistanceMetric, estimated_total_nodes: u64) -> Self {
        let preset = preset_for_scale(estimated_total_nodes);
        let hnsw_config =
            HnswConfig::from_preset(preset.m, preset.ef_construction, preset.ef_search, dimension, metric);
        Self {
            preset,
            index: PartitionedIndex::new(strategy, hnsw_config, preset.max_nodes_per_partition),
            latency: RollingLatency::new(),
            searches_run: AtomicU64::new(0),
        }
    }

    pub fn preset(&self) -> ScalePreset {
        self.preset
    }

    pub fn add_item(&self, id: Uuid, vector: Vec<f32>) -> crate::error::Result<()> {
        self.index.add_item(id, vector)
    }

    pub fn remove_item(&self, id: Uuid) {
        self.index.remove_item(id)
    }

    /// Compacts every partition whose tombstone ratio crossed the threshold
    /// since the last call. Returns how many partitions were compacted.
    pub fn compact_pending(&self) -> usize {
        self.index.compact_pending()
    }

    pub fn average_search_micros(&self) -> u64 {
        self.latency.average()
    }

    pub fn recommended_partition_count(&self) -> usize {
        self.index.recommended_partition_count()
    }

    fn resolve_adaptive(&self) -> SearchStrategy {
        let partitions = self.index.partition_count();
        let avg_micros = self.latency.average();
        if partitions <= 4 {
            SearchStrategy::Exhaustive
        } else if avg_micros > 0 && avg_micros > 50_000 {
            // Recent searches are slow: trade recall for latency.
            SearchStrategy::RandomSubset
        } else {
            SearchStrategy::Beam
        }
    }

    pub fn search(&self, query: &[f32], k: usize, strategy: SearchStrategy) -> Vec<(Uuid, f32)> {
        let started = std::time::Instant::now();
        let resolved = if strategy == SearchStrategy::Adaptive {
            self.resolve_adaptive()
        } else {
            strategy
        };

        let partitions = self.index.partition_count().max(1);
        let max_partitions = match resolved {
            SearchStrategy::Exhaustive => partitions,
            SearchStrategy::Beam => self.preset.max_concurrent_partition_searches.min(partitions),
            SearchStrategy::RandomSubset => (partitions / 4).max(1),
            SearchStrategy::Adaptive => unreachable!("resolved above"),
        };

        let results = self.index.search(query, k, max_partitions);

        self.latency.record(started.elapsed().as_micros() as u64);
        self.searches_run.fetch_add(1, Ordering::Relaxed);
        results
    }

    pub fn searches_run(&self) -> u64 {
        self.searches_run.load(Ordering::Relaxed)
    }
}
