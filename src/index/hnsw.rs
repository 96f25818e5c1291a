//! Per-shard HNSW index (C7, spec §4.5). One instance owns one shard's node
//! set; the partitioned index (C8) owns many of these behind a router.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::RwLock;

use rand::Rng;
use uuid::Uuid;

use crate::distance::{distance_between, DistanceMetric};
use crate::error::{BrainyError, Result};

#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// `1 / ln(m)`, the normalization factor for level sampling.
    ml_norm: f64,
    /// Tombstone fraction of live nodes past which a background compaction
    /// is warranted (spec §4.5: "e.g., 20%").
    pub compaction_threshold: f64,
}

impl HnswConfig {
    fn new(m: usize, ef_construction: usize, ef_search: usize, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            m,
            ef_construction,
            ef_search,
            dimension,
            metric,
            ml_norm: 1.0 / (m as f64).ln(),
            compaction_threshold: 0.20,
        }
    }

    /// `M=32`, `ef_construction=400` — spec §4.5's large-scale defaults.
    pub fn large_scale(dimension: usize, metric: DistanceMetric) -> Self {
        Self::new(32, 400, 100, dimension, metric)
    }

    /// `M=16`, `ef_construction=200` — spec §4.5's small-scale defaults.
    pub fn small_scale(dimension: usize, metric: DistanceMetric) -> Self {
        Self::new(16, 200, 100, dimension, metric)
    }

    /// Builds a config from an arbitrary scale preset (spec §4.7's table),
    /// rather than one of the two built-in defaults above.
    pub fn from_preset(m: usize, ef_construction: usize, ef_search: usize, dimension: usize, metric: DistanceMetric) -> Self {
        Self::new(m, ef_construction, ef_search, dimension, metric)
    }
}

struct Node {
    vector: Vec<f32>,
    /// `neighbors[layer]` is that layer's adjacency list.
    neighbors: Vec<Vec<Uuid>>,
    deleted: bool,
}

struct Candidate {
    id: Uuid,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    /// Min-heap by distance with a lexicographic id tie-break, implemented by
    /// reversing `partial_cmp` since `BinaryHeap` is a max-heap.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

struct Inner {
    nodes: HashMap<Uuid, Node>,
    entry_point: Option<Uuid>,
    max_level: usize,
}

/// One coarse `RwLock` guards the whole graph rather than a per-node ready
/// bit: a write holds it for the full `add_item`, so readers never observe a
/// partially-linked node, at the cost of blocking reads during that write
/// instead of letting them proceed against the prior-consistent graph.
pub struct HnswIndex {
    config: HnswConfig,
    inner: RwLock<Inner>,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                entry_point: None,
                max_level: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().nodes.values().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sample_level(&self) -> usize {
        let u: f64 = rand::thread_rng().gen_range(f64::EPSILON..1.0);
        (-u.ln() * self.config.ml_norm).floor() as usize
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        distance_between(self.config.metric, a, b)
    }

    /// Validates dimension, samples a level, and wires the new node into
    /// every layer from the top down (spec §4.5 `add_item`).
    pub fn add_item(&self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(BrainyError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }

        let level = self.sample_level();
        let mut inner = self.inner.write().unwrap();

        let Some(entry_point) = inner.entry_point else {
            inner.nodes.insert(
                id,
                Node {
                    vector,
                    neighbors: vec![Vec::new(); level + 1],
                    deleted: false,
                },
            );
            inner.entry_point = Some(id);
            inner.max_level = level;
            return Ok(());
        };

        let mut cur = entry_point;
        // Descend through layers above the new node's level with beam width 1.
        for layer in (level + 1..=inner.max_level).rev() {
            cur = Self::greedy_closest(&inner, &vector, cur, layer, self.config.metric);
        }

        let mut neighbors_by_layer = vec![Vec::new(); level + 1];
        for layer in (0..=level.min(inner.max_level)).rev() {
            let candidates = Self::search_layer(
                &inner,
                &vector,
                cur,
                self.config.ef_construction,
                layer,
                self.config.metric,
            );
            let selected = select_neighbors(&candidates, self.config.m);
            neighbors_by_layer[layer] = selected.iter().map(|c| c.id).collect();
            if let Some(closest) = candidates.first() {
                cur = closest.id;
            }

            for &neighbor_id in &neighbors_by_layer[layer] {
                let Some(neighbor_vector) = inner.nodes.get(&neighbor_id).map(|n| n.vector.clone()) else {
                    continue;
                };

                if let Some(neighbor) = inner.nodes.get_mut(&neighbor_id) {
                    if neighbor.neighbors.len() <= layer {
                        neighbor.neighbors.resize(layer + 1, Vec::new());
                    }
                    neighbor.neighbors[layer].push(id);
                }

                let over_connected = inner
                    .nodes
                    .get(&neighbor_id)
                    .map(|n| n.neighbors[layer].len() > self.config.m)
                    .unwrap_or(false);
                if over_connected {
                    let mut ids = inner.nodes[&neighbor_id].neighbors[layer].clone();
                    let distances: HashMap<Uuid, f32> = ids
                        .iter()
                        .map(|nid| {
                            let d = inner
                                .nodes
                                .get(nid)
                                .map(|n| distance_between(self.config.metric, &neighbor_vector, &n.vector))
                                .unwrap_or(f32::MAX);
                            (*nid, d)
                        })
                        .collect();
                    ids.sort_by(|a, b| {
                        distances[a]
                            .partial_cmp(&distances[b])
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.cmp(b))
                    });
                    ids.truncate(self.config.m);
                    if let Some(neighbor) = inner.nodes.get_mut(&neighbor_id) {
                        neighbor.neighbors[layer] = ids;
                    }
                }
            }
        }

        inner.nodes.insert(
            id,
            Node {
                vector,
                neighbors: neighbors_by_layer,
                deleted: false,
            },
        );

        if level > inner.max_level {
            inner.max_level = level;
            inner.entry_point = Some(id);
        }
        Ok(())
    }

    fn greedy_closest(inner: &Inner, query: &[f32], start: Uuid, layer: usize, metric: DistanceMetric) -> Uuid {
        let mut cur = start;
        let mut cur_dist = inner
            .nodes
            .get(&cur)
            .map(|n| distance_between(metric, query, &n.vector))
            .unwrap_or(f32::MAX);
        loop {
            let mut improved = false;
            if let Some(node) = inner.nodes.get(&cur) {
                if let Some(layer_neighbors) = node.neighbors.get(layer) {
                    for &neighbor_id in layer_neighbors {
                        if let Some(neighbor) = inner.nodes.get(&neighbor_id) {
                            if neighbor.deleted {
                                continue;
                            }
                            let d = distance_between(metric, query, &neighbor.vector);
                            if d < cur_dist {
                                cur = neighbor_id;
                                cur_dist = d;
                                improved = true;
                            }
                        }
                    }
                }
            }
            if !improved {
                return cur;
            }
        }
    }

    /// Beam search at a single layer, expanding candidates up to `ef` wide.
    fn search_layer(
        inner: &Inner,
        query: &[f32],
        start: Uuid,
        ef: usize,
        layer: usize,
        metric: DistanceMetric,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: Vec<Candidate> = Vec::new();

        if let Some(node) = inner.nodes.get(&start) {
            let d = distance_between(metric, query, &node.vector);
            candidates.push(Candidate { id: start, distance: d });
            visited.insert(start);
        }

        while let Some(Candidate { id, distance }) = candidates.pop() {
            if results.len() >= ef && distance > worst(&results) {
                break;
            }
            if let Some(node) = inner.nodes.get(&id) {
                if !node.deleted {
                    results.push(Candidate { id, distance });
                }
                if let Some(layer_neighbors) = node.neighbors.get(layer) {
                    for &neighbor_id in layer_neighbors {
                        if visited.insert(neighbor_id) {
                            if let Some(neighbor) = inner.nodes.get(&neighbor_id) {
                                let d = distance_between(metric, query, &neighbor.vector);
                                candidates.push(Candidate { id: neighbor_id, distance: d });
                            }
                        }
                    }
                }
            }
            if results.len() > ef * 4 {
                break;
            }
        }

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(ef.max(1));
        results
    }

    /// `k` closest ids to `query`, lexicographically tie-broken (spec §4.5).
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(Uuid, f32)> {
        let inner = self.inner.read().unwrap();
        let Some(entry_point) = inner.entry_point else {
            return Vec::new();
        };

        let mut cur = entry_point;
        for layer in (1..=inner.max_level).rev() {
            cur = Self::greedy_closest(&inner, query, cur, layer, self.config.metric);
        }

        let mut candidates = Self::search_layer(&inner, query, cur, self.config.ef_search.max(k), 0, self.config.metric);
        candidates.truncate(k);
        candidates.into_iter().map(|c| (c.id, c.distance)).collect()
    }

    /// Lazy deletion: mark the node as a tombstone without rewiring its
    /// neighbors (spec §4.5). Returns whether compaction is now warranted.
    pub fn remove_item(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.deleted = true;
        }
        let live = inner.nodes.values().filter(|n| !n.deleted).count().max(1);
        let tombstones = inner.nodes.values().filter(|n| n.deleted).count();
        (tombstones as f64 / live as f64) >= self.config.compaction_threshold
    }

    /// Rebuilds the graph from scratch using only live nodes, dropping every
    /// tombstone (spec §4.5: "a background compaction may rebuild").
    pub fn compact(&self) {
        let live: Vec<(Uuid, Vec<f32>)> = {
            let inner = self.inner.read().unwrap();
            inner
                .nodes
                .iter()
                .filter(|(_, n)| !n.deleted)
                .map(|(id, n)| (*id, n.vector.clone()))
                .collect()
        };
        {
            let mut inner = self.inner.write().unwrap();
            inner.nodes.clear();
            inner.entry_point = None;
            inner.max_level = 0;
        }
        for (id, vector) in live {
            let _ = self.add_item(id, vector);
        }
    }

    /// `{level_string: [id, ...]}` with ids in lexicographic order, as spec
    /// §4.1's keyspace note requires for any on-disk representation.
    pub fn neighbor_snapshot(&self, id: Uuid) -> Option<HashMap<String, Vec<Uuid>>> {
        let inner = self.inner.read().unwrap();
        let node = inner.nodes.get(&id)?;
        let mut out = HashMap::new();
        for (level, neighbors) in node.neighbors.iter().enumerate() {
            let mut sorted = neighbors.clone();
            sorted.sort();
            out.insert(level.to_string(), sorted);
        }
        Some(out)
    }
}

fn worst(results: &[Candidate]) -> f32 {
    results.iter().map(|c| c.distance).fold(f32::MIN, f32::max)
}

/// Heuristic neighbor selection (spec §4.5: "heuristic-select up to M
/// neighbors"): the M closest candidates, already distance-sorted.
fn select_neighbors(candidates: &[Candidate], m: usize) -> Vec<&Candidate> {
    candidates.iter().take(m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> HnswIndex {
        HnswIndex::new(HnswConfig::small_scale(4, DistanceMetric::Euclidean))
    }

    #[test]
    fn add_then_search_returns_the_inserted_id_within_top_k() {
        let idx = index();
        let id = Uuid::new_v4();
        idx.add_item(id, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        for _ in 0..20 {
            idx.add_item(Uuid::new_v4(), vec![rand::random(), rand::random(), rand::random(), rand::random()])
                .unwrap();
        }
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 5);
        assert!(results.iter().any(|(found_id, _)| *found_id == id));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let idx = index();
        let err = idx.add_item(Uuid::new_v4(), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, BrainyError::DimensionMismatch { .. }));
    }

    #[test]
    fn search_on_empty_index_returns_nothing() {
        let idx = index();
        assert!(idx.search(&[0.0, 0.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn removed_item_is_tombstoned_and_excluded_from_search() {
        let idx = index();
        let id = Uuid::new_v4();
        idx.add_item(id, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.add_item(Uuid::new_v4(), vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        idx.remove_item(id);
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 5);
        assert!(!results.iter().any(|(found_id, _)| *found_id == id));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn compaction_triggers_past_threshold_and_drops_tombstones() {
        let idx = index();
        let ids: Vec<Uuid> = (0..10)
            .map(|i| {
                let id = Uuid::new_v4();
                idx.add_item(id, vec![i as f32, 0.0, 0.0, 0.0]).unwrap();
                id
            })
            .collect();
        let mut warranted = false;
        for id in &ids[0..3] {
            warranted |= idx.remove_item(*id);
        }
        assert!(warranted);
        idx.compact();
        assert_eq!(idx.len(), 7);
    }
}
