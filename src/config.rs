//! Runtime configuration (spec §6's recognized option names). The crate
//! never parses files itself — callers hand in an already-built
//! `BrainyConfig`, or use [`BrainyConfig::from_yaml_str`] if they happen to
//! have a YAML string lying around, in the style of the teacher's
//! `serde_yaml`-based service configs.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{BrainyError, Result};
use crate::index::{PartitionStrategy, ScalePreset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Memory,
    LocalFs,
    S3,
    Gcs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub kind: Option<StorageKind>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
}

fn default_storage_kind() -> Option<StorageKind> {
    Some(StorageKind::Memory)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { kind: default_storage_kind(), bucket: None, prefix: None, region: None, credentials: None }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HnswSettings {
    #[serde(rename = "M", default)]
    pub m: Option<usize>,
    #[serde(default)]
    pub ef_construction: Option<usize>,
    #[serde(default)]
    pub ef_search: Option<usize>,
    #[serde(default)]
    pub ml: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategyConfig {
    Hash,
    Semantic,
}

impl From<PartitionStrategyConfig> for PartitionStrategy {
    fn from(value: PartitionStrategyConfig) -> Self {
        match value {
            PartitionStrategyConfig::Hash => PartitionStrategy::Hash,
            PartitionStrategyConfig::Semantic => PartitionStrategy::Semantic,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartitionSettings {
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default = "default_partition_strategy")]
    pub strategy: PartitionStrategyConfig,
    #[serde(default = "default_true")]
    pub auto_tune: bool,
}

fn default_partition_strategy() -> PartitionStrategyConfig {
    PartitionStrategyConfig::Hash
}

fn default_true() -> bool {
    true
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self { max_nodes: None, strategy: default_partition_strategy(), auto_tune: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub hnsw: HnswSettings,
    #[serde(default)]
    pub partition: PartitionSettings,
    /// Not one of §6's named options — the vector dimension is fixed per
    /// process (spec §3 invariant 2) and has to come from somewhere; an
    /// `Embedder`'s `dimension()` overrides this when one is configured.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,
}

fn default_dimension() -> usize {
    768
}

fn default_metric() -> DistanceMetric {
    DistanceMetric::Cosine
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw: HnswSettings::default(),
            partition: PartitionSettings::default(),
            dimension: default_dimension(),
            metric: default_metric(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub hot_max: usize,
    pub warm_max: usize,
    pub max_age_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { hot_max: 1_000, warm_max: 5_000, max_age_ms: 5 * 60_000 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchCacheConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
    pub enabled: bool,
}

impl Default for SearchCacheConfig {
    fn default() -> Self {
        Self { max_size: 1_000, ttl_ms: 60_000, enabled: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max: usize,
    pub read_only: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max: 100, read_only: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    pub id: String,
    pub priority: i32,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleTier {
    Small,
    Medium,
    Large,
    Huge,
}

impl ScaleTier {
    pub fn from_expected_nouns(expected_nouns: u64) -> Self {
        if expected_nouns <= 10_000 {
            ScaleTier::Small
        } else if expected_nouns <= 100_000 {
            ScaleTier::Medium
        } else if expected_nouns <= 1_000_000 {
            ScaleTier::Large
        } else {
            ScaleTier::Huge
        }
    }

    /// A representative node count for this tier, handed to
    /// [`crate::index::preset_for_scale`] to resolve the actual HNSW/cache
    /// parameter row (spec §4.7's table).
    pub fn representative_node_count(self) -> u64 {
        match self {
            ScaleTier::Small => 10_000,
            ScaleTier::Medium => 100_000,
            ScaleTier::Large => 1_000_000,
            ScaleTier::Huge => 5_000_000,
        }
    }

    pub fn preset(self) -> ScalePreset {
        crate::index::preset_for_scale(self.representative_node_count())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainyConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search_cache: SearchCacheConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub augmentations: Vec<AugmentationConfig>,
    /// Used to infer a [`ScaleTier`] when one isn't set explicitly.
    #[serde(default)]
    pub expected_nouns: Option<u64>,
    #[serde(default)]
    pub scale_tier: Option<ScaleTier>,
}

impl BrainyConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| BrainyError::InvalidInput(e.to_string()))
    }

    pub fn resolve_scale_tier(&self) -> ScaleTier {
        self.scale_tier
            .unwrap_or_else(|| ScaleTier::from_expected_nouns(self.expected_nouns.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_memory_storage() {
        let config = BrainyConfig::default();
        assert_eq!(config.storage.kind, Some(StorageKind::Memory));
    }

    #[test]
    fn yaml_round_trips_through_from_yaml_str() {
        let yaml = "storage:\n  kind: local_fs\n  bucket: data\nconcurrency:\n  max: 42\n  read_only: false\n";
        let config = BrainyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.storage.kind, Some(StorageKind::LocalFs));
        assert_eq!(config.concurrency.max, 42);
    }

    #[test]
    fn scale_tier_inferred_from_expected_nouns() {
        let mut config = BrainyConfig::default();
        config.expected_nouns = Some(500_000);
        assert_eq!(config.resolve_scale_tier(), ScaleTier::Large);
    }

    #[test]
    fn explicit_scale_tier_overrides_expected_nouns() {
        let mut config = BrainyConfig::default();
        config.expected_nouns = Some(500_000);
        config.scale_tier = Some(ScaleTier::Small);
        assert_eq!(config.resolve_scale_tier(), ScaleTier::Small);
    }
}
