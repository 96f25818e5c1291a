//! Hybrid query planner (C13, spec §4.11) — vectorize, recall, filter,
//! graph-boost, truncate. All four phases are idempotent; a recoverable
//! per-candidate failure is dropped with a diagnostic flag rather than
//! failing the whole query.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::embedder::Embedder;
use crate::error::{BrainyError, Result};
use crate::index::{ScaledSearchCoordinator, SearchStrategy};
use crate::storage::StorageEngine;
use crate::types::{Attributes, NounType, Value, VerbType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone)]
pub struct TraversalSpec {
    pub verb_types: Option<Vec<VerbType>>,
    pub direction: TraversalDirection,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query_text: Option<String>,
    pub query_vector: Option<Vec<f32>>,
    pub k: usize,
    pub noun_type_filter: Option<Vec<NounType>>,
    /// Exact-match attribute predicate: every listed key must be present
    /// with the given scalar value, rendered via its string form.
    pub attribute_predicate: Option<BTreeMap<String, String>>,
    pub from_ids: Option<Vec<Uuid>>,
    pub traversal: Option<TraversalSpec>,
    pub alpha: f32,
    pub beta: f32,
}

impl QueryRequest {
    /// `score = α · similarity + β · graph_score`, defaulting to pure
    /// similarity ranking when no traversal spec is present.
    pub fn default_weights() -> (f32, f32) {
        (1.0, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: Uuid,
    pub score: f32,
    pub depth: Option<u32>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub hits: Vec<QueryHit>,
    /// Set when a recoverable per-candidate failure was dropped rather than
    /// propagated (spec §4.11: "best-effort result with a diagnostic flag").
    pub partial: bool,
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Scalar(crate::types::Scalar::Text(s)) => Some(s.clone()),
        Value::Scalar(crate::types::Scalar::Int(i)) => Some(i.to_string()),
        Value::Scalar(crate::types::Scalar::Float(f)) => Some(f.to_string()),
        Value::Scalar(crate::types::Scalar::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn matches_predicate(attributes: &Attributes, predicate: &BTreeMap<String, String>) -> bool {
    predicate.iter().all(|(key, expected)| {
        attributes.get(key).and_then(value_as_string).map(|actual| &actual == expected).unwrap_or(false)
    })
}

pub struct HybridQueryPlanner<'a> {
    storage: &'a StorageEngine,
    coordinator: &'a ScaledSearchCoordinator,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> HybridQueryPlanner<'a> {
    pub fn new(storage: &'a StorageEngine, coordinator: &'a ScaledSearchCoordinator, embedder: Option<&'a dyn Embedder>) -> Self {
        Self { storage, coordinator, embedder }
    }

    pub async fn plan(&self, request: &QueryRequest) -> Result<QueryResult> {
        let vector = self.vectorize(request).await?;
        let recalled = self.recall(&vector, request);
        let (candidates, mut partial) = self.filter_candidates(recalled, request).await;
        let hits = self.graph_boost(candidates, request, &mut partial).await?;
        Ok(self.truncate(hits, request.k, partial))
    }

    async fn vectorize(&self, request: &QueryRequest) -> Result<Vec<f32>> {
        if let Some(vector) = &request.query_vector {
            return Ok(vector.clone());
        }
        let text = request
            .query_text
            .as_ref()
            .ok_or_else(|| BrainyError::InvalidInput("query requires either a vector or text".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| BrainyError::InvalidInput("no Embedder configured for a text query".to_string()))?;
        embedder.embed(text).await
    }

    fn recall(&self, vector: &[f32], request: &QueryRequest) -> Vec<(Uuid, f32)> {
        let filter_slack = request.noun_type_filter.as_ref().map(|f| f.len()).unwrap_or(0) * request.k.max(1);
        let k_eff = request.k.max(2 * request.k).max(1) + filter_slack;
        self.coordinator.search(vector, k_eff, SearchStrategy::Adaptive)
    }

    async fn filter_candidates(&self, recalled: Vec<(Uuid, f32)>, request: &QueryRequest) -> (Vec<(Uuid, f32)>, bool) {
        let mut candidates = Vec::new();
        let mut partial = false;
        for (id, distance) in recalled {
            match self.storage.get_noun(id).await {
                Ok(Some(noun)) => {
                    if let Some(types) = &request.noun_type_filter {
                        if !types.contains(&noun.noun_type) {
                            continue;
                        }
                    }
                    if let Some(predicate) = &request.attribute_predicate {
                        if !matches_predicate(&noun.attributes, predicate) {
                            continue;
                        }
                    }
                    let similarity = (1.0 - distance).clamp(0.0, 1.0);
                    candidates.push((id, similarity));
                }
                Ok(None) => {
                    // Recall hit pointing at a since-deleted noun: drop silently.
                }
                Err(_) => partial = true,
            }
        }
        (candidates, partial)
    }

    async fn graph_boost(&self, candidates: Vec<(Uuid, f32)>, request: &QueryRequest, partial: &mut bool) -> Result<Vec<QueryHit>> {
        let (Some(from_ids), Some(traversal)) = (&request.from_ids, &request.traversal) else {
            return Ok(candidates
                .into_iter()
                .map(|(id, similarity)| QueryHit { id, score: similarity, depth: None, explanation: None })
                .collect());
        };

        let depths = match self.bfs_depths(from_ids, traversal).await {
            Ok(depths) => depths,
            Err(_) => {
                *partial = true;
                HashMap::new()
            }
        };

        Ok(candidates
            .into_iter()
            .map(|(id, similarity)| {
                let depth = depths.get(&id).copied();
                let graph_score = depth.map(|d| if d == 0 { 1.0 } else { 1.0 / d as f32 }).unwrap_or(0.0);
                let score = request.alpha * similarity + request.beta * graph_score;
                QueryHit { id, score, depth, explanation: None }
            })
            .collect())
    }

    async fn bfs_depths(&self, from_ids: &[Uuid], traversal: &TraversalSpec) -> Result<HashMap<Uuid, u32>> {
        let mut depths: HashMap<Uuid, u32> = from_ids.iter().map(|id| (*id, 0)).collect();
        let mut frontier: Vec<Uuid> = from_ids.to_vec();

        for depth in 1..=traversal.max_depth {
            let mut next_frontier = Vec::new();
            for id in &frontier {
                let verbs = match traversal.direction {
                    TraversalDirection::Outgoing => self.storage.get_verbs_by_source(*id).await?,
                    TraversalDirection::Incoming => self.storage.get_verbs_by_target(*id).await?,
                    TraversalDirection::Both => {
                        let mut verbs = self.storage.get_verbs_by_source(*id).await?;
                        verbs.extend(self.storage.get_verbs_by_target(*id).await?);
                        verbs
                    }
                };
                for verb in verbs {
                    if let Some(types) = &traversal.verb_types {
                        if !types.contains(&verb.verb_type) {
                            continue;
                        }
                    }
                    let neighbor = if verb.source_id == *id { verb.target_id } else { verb.source_id };
                    if let std::collections::hash_map::Entry::Vacant(entry) = depths.entry(neighbor) {
                        entry.insert(depth as u32);
                        next_frontier.push(neighbor);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(depths)
    }

    fn truncate(&self, mut hits: Vec<QueryHit>, k: usize, partial: bool) -> QueryResult {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        QueryResult { hits, partial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::AdmissionControl;
    use crate::index::{HnswConfig, PartitionStrategy};
    use crate::types::{CreatorTag, NounType, Scalar};
    use std::sync::Arc;
    use std::time::Duration;

    async fn build() -> (StorageEngine, ScaledSearchCoordinator) {
        let backend = Arc::new(MemoryBackend::new());
        let admission = AdmissionControl::new(100);
        let storage = StorageEngine::new(backend, admission, 100, 100, Duration::from_secs(60));
        storage.init().await.unwrap();
        let coordinator =
            ScaledSearchCoordinator::new(PartitionStrategy::Hash, 3, crate::distance::DistanceMetric::Euclidean, 1_000);
        (storage, coordinator)
    }

    fn noun(id: Uuid, noun_type: NounType, vector: Vec<f32>) -> crate::types::Noun {
        crate::types::Noun {
            id,
            noun_type,
            vector,
            created_at: crate::types::Timestamp::default(),
            updated_at: crate::types::Timestamp::default(),
            creator_tag: CreatorTag::default(),
            label: None,
            attributes: Default::default(),
        }
    }

    #[tokio::test]
    async fn vector_query_recalls_and_ranks_by_similarity() {
        let (storage, coordinator) = build().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        storage.save_noun(noun(a, NounType::Person, vec![1.0, 0.0, 0.0]), true).await.unwrap();
        storage.save_noun(noun(b, NounType::Person, vec![0.0, 1.0, 0.0]), true).await.unwrap();
        coordinator.add_item(a, vec![1.0, 0.0, 0.0]).unwrap();
        coordinator.add_item(b, vec![0.0, 1.0, 0.0]).unwrap();

        let planner = HybridQueryPlanner::new(&storage, &coordinator, None);
        let request =
            QueryRequest { query_vector: Some(vec![1.0, 0.0, 0.0]), k: 1, ..QueryRequest::default() };
        let result = planner.plan(&request).await.unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].id, a);
    }

    #[tokio::test]
    async fn text_query_without_embedder_is_rejected() {
        let (storage, coordinator) = build().await;
        let planner = HybridQueryPlanner::new(&storage, &coordinator, None);
        let request = QueryRequest { query_text: Some("hello".into()), k: 1, ..QueryRequest::default() };
        let result = planner.plan(&request).await;
        assert!(matches!(result, Err(BrainyError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn noun_type_filter_excludes_non_matching_types() {
        let (storage, coordinator) = build().await;
        let person = Uuid::new_v4();
        let document = Uuid::new_v4();
        storage.save_noun(noun(person, NounType::Person, vec![1.0, 0.0, 0.0]), true).await.unwrap();
        storage.save_noun(noun(document, NounType::Document, vec![1.0, 0.0, 0.0]), true).await.unwrap();
        coordinator.add_item(person, vec![1.0, 0.0, 0.0]).unwrap();
        coordinator.add_item(document, vec![1.0, 0.0, 0.0]).unwrap();

        let planner = HybridQueryPlanner::new(&storage, &coordinator, None);
        let request = QueryRequest {
            query_vector: Some(vec![1.0, 0.0, 0.0]),
            k: 2,
            noun_type_filter: Some(vec![NounType::Person]),
            ..QueryRequest::default()
        };
        let result = planner.plan(&request).await.unwrap();
        assert!(result.hits.iter().all(|h| h.id != document));
    }

    #[tokio::test]
    async fn attribute_predicate_filters_on_exact_match() {
        let (storage, coordinator) = build().await;
        let id = Uuid::new_v4();
        let mut n = noun(id, NounType::Person, vec![1.0, 0.0, 0.0]);
        n.attributes.insert("country".into(), Value::Scalar(Scalar::Text("US".into())));
        storage.save_noun(n, true).await.unwrap();
        coordinator.add_item(id, vec![1.0, 0.0, 0.0]).unwrap();

        let planner = HybridQueryPlanner::new(&storage, &coordinator, None);
        let mut predicate = BTreeMap::new();
        predicate.insert("country".to_string(), "CA".to_string());
        let request = QueryRequest {
            query_vector: Some(vec![1.0, 0.0, 0.0]),
            k: 1,
            attribute_predicate: Some(predicate),
            ..QueryRequest::default()
        };
        let result = planner.plan(&request).await.unwrap();
        assert!(result.hits.is_empty());
    }
}
