//! Vector indexing: per-shard HNSW graphs (C7), the partitioned router that
//! fans them out (C8), and the scale-aware coordinator that picks HNSW
//! parameters and a search strategy from corpus size (C9).

pub mod coordinator;
pub mod hnsw;
pub mod partition;

pub use coordinator::{preset_for_scale, ScalePreset, ScaledSearchCoordinator, SearchStrategy};
pub use hnsw::{HnswConfig, HnswIndex};
pub use partition::{PartitionStrategy, PartitionedIndex, MAX_PARTITIONS};
