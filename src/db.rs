//! `Brainy` (spec §6) — the public façade wiring storage, the scaled search
//! coordinator, the search-result cache, the augmentation pipeline, the
//! hybrid query planner and the relationship classifier into one handle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::augmentation::audit_aug::AuditLogAugmentation;
use crate::augmentation::cache_aug::CacheAugmentation;
use crate::augmentation::metrics_aug::MetricsAugmentation;
use crate::augmentation::{Augmentation, Operation, OperationContext, OperationOutcome, Pipeline};
use crate::backend::{LocalFsBackend, MemoryBackend, ObjectStoreBackend, StorageBackend};
use crate::cache::AdmissionControl;
use crate::classifier::{ClassificationResult, ClassifyInput, RelationshipClassifier};
use crate::config::{BrainyConfig, StorageKind};
use crate::embedder::{Embedder, NullEmbedder};
use crate::error::{BrainyError, Result};
use crate::index::{PartitionStrategy, ScaledSearchCoordinator};
use crate::planner::{HybridQueryPlanner, QueryRequest, TraversalSpec};
use crate::search_cache::{self, SearchResultCache};
use crate::storage::StorageEngine;
use crate::types::{Attributes, CreatorTag, Noun, NounType, Statistics, Timestamp, Value, Verb, VerbType};

const BACKGROUND_TICK: Duration = Duration::from_secs(5);

fn now_timestamp() -> Timestamp {
    Timestamp::from_chrono(chrono::Utc::now())
}

#[derive(Debug, Clone)]
pub struct FindFilter {
    pub noun_types: Option<Vec<NounType>>,
    pub attributes: Option<BTreeMap<String, String>>,
    pub from_ids: Option<Vec<Uuid>>,
    pub traversal: Option<TraversalSpec>,
    pub alpha: f32,
    pub beta: f32,
}

impl Default for FindFilter {
    /// Pure vector similarity, no graph boost — the derived `Default` would
    /// leave `alpha` at 0.0 and silently zero every score.
    fn default() -> Self {
        Self { noun_types: None, attributes: None, from_ids: None, traversal: None, alpha: 1.0, beta: 0.0 }
    }
}

impl FindFilter {
    fn digest(&self) -> String {
        let mut map = self.attributes.clone().unwrap_or_default();
        if let Some(types) = &self.noun_types {
            let mut tags: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            tags.sort_unstable();
            map.insert("__noun_types".to_string(), tags.join(","));
        }
        search_cache::filter_digest(&map)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindRequest {
    pub query: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub k: usize,
    pub filter: Option<FindFilter>,
    pub include_metadata: bool,
    pub include_vectors: bool,
    pub skip_cache: bool,
}

#[derive(Debug, Clone)]
pub struct FindHit {
    pub id: Uuid,
    pub score: f32,
    pub noun: Option<Noun>,
}

#[derive(Debug, Clone, Default)]
pub struct FindResult {
    pub hits: Vec<FindHit>,
    pub partial: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarRequest {
    pub id: Option<Uuid>,
    pub vector: Option<Vec<f32>>,
    pub k: usize,
    pub threshold: Option<f32>,
    pub filter: Option<FindFilter>,
}

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub id: Option<Uuid>,
    pub data: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub noun_type: NounType,
    pub metadata: Option<Attributes>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub id: Uuid,
    pub metadata: Option<Attributes>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelateRequest {
    pub from: Uuid,
    pub to: Uuid,
    pub verb_type: VerbType,
    pub weight: Option<f32>,
    pub metadata: Option<Attributes>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackupBundle {
    pub nouns: Vec<Noun>,
    pub verbs: Vec<Verb>,
}

/// Constructs the [`StorageBackend`] named by `config.storage.kind`. `Gcs`
/// reads `storage.credentials` as the service-account JSON path; `S3` has no
/// matching field in spec §6's config surface and relies on ambient AWS
/// credential resolution the way `ObjectStoreBackend::s3` already does.
async fn backend_from_config(config: &BrainyConfig) -> Result<Arc<dyn StorageBackend>> {
    let storage = &config.storage;
    match storage.kind.unwrap_or(StorageKind::Memory) {
        StorageKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageKind::LocalFs => {
            let root = storage
                .bucket
                .clone()
                .or_else(|| storage.prefix.clone())
                .ok_or_else(|| BrainyError::InvalidInput("local_fs storage requires `bucket` (used as the root directory)".to_string()))?;
            Ok(Arc::new(LocalFsBackend::new(root)))
        }
        StorageKind::S3 => {
            let bucket = storage
                .bucket
                .as_deref()
                .ok_or_else(|| BrainyError::InvalidInput("s3 storage requires `bucket`".to_string()))?;
            let region = storage
                .region
                .as_deref()
                .ok_or_else(|| BrainyError::InvalidInput("s3 storage requires `region`".to_string()))?;
            let backend = ObjectStoreBackend::s3(bucket, region)
                .map_err(|e| BrainyError::BackendUnavailable(e.to_string()))?;
            Ok(Arc::new(backend))
        }
        StorageKind::Gcs => {
            let bucket = storage
                .bucket
                .as_deref()
                .ok_or_else(|| BrainyError::InvalidInput("gcs storage requires `bucket`".to_string()))?;
            let service_account_path = storage
                .credentials
                .as_deref()
                .ok_or_else(|| BrainyError::InvalidInput("gcs storage requires `credentials` (a service-account JSON path)".to_string()))?;
            let backend = ObjectStoreBackend::gcs(bucket, service_account_path)
                .map_err(|e| BrainyError::BackendUnavailable(e.to_string()))?;
            Ok(Arc::new(backend))
        }
    }
}

pub struct BrainyBuilder {
    embedder: Option<Arc<dyn Embedder>>,
    backend: Option<Arc<dyn StorageBackend>>,
    augmentations: Vec<Arc<dyn Augmentation>>,
}

impl BrainyBuilder {
    pub fn new() -> Self {
        Self { embedder: None, backend: None, augmentations: Vec::new() }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Overrides the backend `config.storage` would otherwise construct —
    /// mainly so callers can share a single `MemoryBackend` across instances
    /// in tests, or hand in an `ObjectStoreBackend` they built themselves.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Registers an additional augmentation on top of the built-in cache,
    /// metrics and audit-log ones. `config.augmentations` is descriptive
    /// metadata only (trait objects can't be deserialized from config), so
    /// this is the only way to attach one.
    pub fn with_augmentation(mut self, augmentation: Arc<dyn Augmentation>) -> Self {
        self.augmentations.push(augmentation);
        self
    }

    #[instrument(skip(self, config))]
    pub async fn build(self, config: BrainyConfig) -> Result<Brainy> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => backend_from_config(&config).await?,
        };

        let dimension = self.embedder.as_ref().map(|e| e.dimension()).unwrap_or(config.index.dimension);
        let admission = AdmissionControl::new(config.concurrency.max);
        let storage = Arc::new(StorageEngine::new(
            backend,
            admission.clone(),
            config.cache.hot_max,
            config.cache.warm_max,
            Duration::from_millis(config.cache.max_age_ms),
        ));
        storage.init().await?;

        let search_cache = Arc::new(SearchResultCache::new(
            config.search_cache.max_size,
            Duration::from_millis(config.search_cache.ttl_ms),
        ));
        storage.set_invalidation_hook(search_cache.clone());

        let strategy: PartitionStrategy = config.index.partition.strategy.into();
        let estimated_total_nodes = config.resolve_scale_tier().representative_node_count();
        let coordinator = Arc::new(ScaledSearchCoordinator::new(strategy, dimension, config.index.metric, estimated_total_nodes));
        let rehydrated = rehydrate_coordinator(&storage, &coordinator).await?;
        if rehydrated > 0 {
            info!(rehydrated, "rehydrated persisted noun vectors into the search index");
        }

        let pipeline = Arc::new(Pipeline::new());
        if config.search_cache.enabled {
            pipeline.register(Arc::new(CacheAugmentation::new(search_cache.clone())));
        }
        pipeline.register(Arc::new(MetricsAugmentation::new()));
        pipeline.register(Arc::new(AuditLogAugmentation::new(1_000, Duration::from_secs(24 * 3600))));
        for augmentation in self.augmentations {
            pipeline.register(augmentation);
        }

        let embedder: Arc<dyn Embedder> = self.embedder.unwrap_or_else(|| Arc::new(NullEmbedder::new(dimension)));
        let classifier = Arc::new(RelationshipClassifier::new(dimension));

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());
        let background = spawn_background_task(storage.clone(), admission, coordinator.clone(), shutdown_flag.clone(), shutdown_notify.clone());

        Ok(Brainy {
            storage,
            coordinator,
            search_cache,
            pipeline,
            embedder,
            classifier,
            dimension,
            shutdown_flag,
            shutdown_notify,
            background: std::sync::Mutex::new(Some(background)),
        })
    }
}

/// Rebuilds the in-memory HNSW index from persisted vectors — without this,
/// a fresh process reopening an existing `local_fs`/`object_store` bucket
/// would have an empty index despite the backend holding live nouns, and
/// `find`/`similar` would silently return nothing. Returns how many vectors
/// were re-indexed.
async fn rehydrate_coordinator(storage: &Arc<StorageEngine>, coordinator: &Arc<ScaledSearchCoordinator>) -> Result<usize> {
    let mut total = 0;
    let mut cursor = None;
    loop {
        let page = storage.rehydrate_vectors(cursor, 1000).await?;
        for (id, vector) in page.items {
            coordinator.add_item(id, vector)?;
            total += 1;
        }
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }
    Ok(total)
}

impl Default for BrainyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_background_task(
    storage: Arc<StorageEngine>,
    admission: Arc<AdmissionControl>,
    coordinator: Arc<ScaledSearchCoordinator>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(BACKGROUND_TICK) => {}
                _ = shutdown_notify.notified() => break,
            }
            if shutdown_flag.load(Ordering::SeqCst) {
                break;
            }
            admission.tick_memory_pressure();
            if let Err(e) = storage.maybe_flush_statistics().await {
                warn!(error = %e, "periodic statistics flush failed");
            }
            let compacted = coordinator.compact_pending();
            if compacted > 0 {
                debug!(compacted, "compacted tombstone-heavy partitions");
            }
            debug!(
                recommended_partitions = coordinator.recommended_partition_count(),
                searches_run = coordinator.searches_run(),
                "background maintenance tick"
            );
        }
    })
}

pub struct Brainy {
    storage: Arc<StorageEngine>,
    coordinator: Arc<ScaledSearchCoordinator>,
    search_cache: Arc<SearchResultCache>,
    pipeline: Arc<Pipeline>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<RelationshipClassifier>,
    dimension: usize,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    background: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Brainy {
    pub fn builder() -> BrainyBuilder {
        BrainyBuilder::new()
    }

    pub async fn init(config: BrainyConfig) -> Result<Self> {
        BrainyBuilder::new().build(config).await
    }

    async fn dispatch<F>(&self, operation: Operation, params: serde_json::Value, builtin: F) -> Result<OperationOutcome>
    where
        F: FnOnce() -> futures::future::BoxFuture<'static, Result<OperationOutcome>> + Send + 'static,
    {
        let ctx = OperationContext { operation, params, session_id: None };
        self.pipeline.dispatch(ctx, builtin).await
    }

    async fn resolve_vector(&self, data: Option<&str>, vector: Option<Vec<f32>>) -> Result<Vec<f32>> {
        let vector = match (data, vector) {
            (_, Some(vector)) => vector,
            (Some(text), None) => self.embedder.embed(text).await?,
            (None, None) => return Err(BrainyError::InvalidInput("add requires either `data` or `vector`".to_string())),
        };
        if vector.len() != self.dimension {
            return Err(BrainyError::DimensionMismatch { expected: self.dimension, actual: vector.len() });
        }
        Ok(vector)
    }

    // ---- writes ----

    #[instrument(skip(self, request))]
    pub async fn add(&self, request: AddRequest) -> Result<Uuid> {
        let vector = self.resolve_vector(request.data.as_deref(), request.vector).await?;
        let id = request.id.unwrap_or_else(Uuid::new_v4);
        let now = now_timestamp();
        let noun = Noun {
            id,
            noun_type: request.noun_type,
            vector,
            created_at: now,
            updated_at: now,
            creator_tag: CreatorTag::default(),
            label: request.label,
            attributes: request.metadata.unwrap_or_default(),
        };

        let params = serde_json::json!({ "id": id, "type": noun.noun_type.as_str() });
        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        let stored = noun.clone();
        self.dispatch(Operation::Add, params, move || {
            Box::pin(async move {
                storage.save_noun(stored.clone(), true).await?;
                coordinator.add_item(stored.id, stored.vector.clone())?;
                Ok(OperationOutcome::Noun(Some(stored)))
            })
        })
        .await?;
        info!(%id, "noun added");
        Ok(id)
    }

    /// Vector and type are immutable once written; `update` replaces label
    /// and attributes only, per the invariant documented on [`Noun`].
    #[instrument(skip(self, request))]
    pub async fn update(&self, request: UpdateRequest) -> Result<Noun> {
        let existing = self.storage.get_noun(request.id).await?.ok_or(BrainyError::NotFound { id: request.id })?;
        let mut updated = existing;
        updated.label = request.label;
        updated.attributes = request.metadata.unwrap_or_default();
        updated.updated_at = now_timestamp();

        let params = serde_json::json!({ "id": request.id });
        let storage = self.storage.clone();
        let stored = updated.clone();
        self.dispatch(Operation::Update, params, move || {
            Box::pin(async move {
                storage.save_noun(stored.clone(), false).await?;
                Ok(OperationOutcome::Noun(Some(stored)))
            })
        })
        .await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let params = serde_json::json!({ "id": id });
        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        let outcome = self
            .dispatch(Operation::Delete, params, move || {
                Box::pin(async move {
                    let existed = storage.delete_noun(id).await?;
                    coordinator.remove_item(id);
                    Ok(OperationOutcome::Bool(existed))
                })
            })
            .await?;
        match outcome {
            OperationOutcome::Bool(existed) => Ok(existed),
            OperationOutcome::Cancelled => Err(BrainyError::Cancelled),
            _ => Err(BrainyError::Internal(anyhow::anyhow!("unexpected outcome shape for delete"))),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Noun>> {
        self.storage.get_noun(id).await
    }

    #[instrument(skip(self, request))]
    pub async fn relate(&self, request: RelateRequest) -> Result<Uuid> {
        // Invariant (spec §8.5): source/target must resolve at relate time —
        // dangling edges only ever arise from a *later* deletion.
        if self.storage.get_noun(request.from).await?.is_none() {
            return Err(BrainyError::NotFound { id: request.from });
        }
        if self.storage.get_noun(request.to).await?.is_none() {
            return Err(BrainyError::NotFound { id: request.to });
        }

        let now = now_timestamp();
        let mut verb = Verb {
            id: Uuid::new_v4(),
            source_id: request.from,
            target_id: request.to,
            verb_type: request.verb_type,
            created_at: now,
            updated_at: now,
            creator_tag: CreatorTag::default(),
            weight: request.weight.unwrap_or(0.5),
            confidence: None,
            label: None,
            attributes: request.metadata.unwrap_or_default(),
            vector: None,
        };
        verb.normalize();

        let params = serde_json::json!({ "from": request.from, "to": request.to, "type": verb.verb_type.as_str() });
        let storage = self.storage.clone();
        let stored = verb.clone();
        self.dispatch(Operation::Relate, params, move || {
            Box::pin(async move {
                storage.save_verb(stored.clone(), true).await?;
                Ok(OperationOutcome::Verb(Some(stored)))
            })
        })
        .await?;
        Ok(verb.id)
    }

    #[instrument(skip(self))]
    pub async fn unrelate(&self, id: Uuid) -> Result<bool> {
        let params = serde_json::json!({ "id": id });
        let storage = self.storage.clone();
        let outcome = self
            .dispatch(Operation::Unrelate, params, move || Box::pin(async move { Ok(OperationOutcome::Bool(storage.delete_verb(id).await?)) }))
            .await?;
        match outcome {
            OperationOutcome::Bool(existed) => Ok(existed),
            OperationOutcome::Cancelled => Err(BrainyError::Cancelled),
            _ => Err(BrainyError::Internal(anyhow::anyhow!("unexpected outcome shape for unrelate"))),
        }
    }

    // ---- reads ----

    #[instrument(skip(self, request))]
    pub async fn find(&self, request: FindRequest) -> Result<FindResult> {
        let vector = self.resolve_query_vector(request.query.as_deref(), request.vector.clone()).await?;
        let filter_digest = request.filter.as_ref().map(|f| f.digest());

        let params = serde_json::json!({
            "query_vector": vector,
            "k": request.k,
            "filter_digest": filter_digest,
            "skip_cache": request.skip_cache,
        });

        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        let filter = request.filter.clone();
        let k = request.k;
        let planner_vector = vector;
        let outcome = self
            .dispatch(Operation::Search, params, move || {
                Box::pin(async move {
                    let planner = HybridQueryPlanner::new(storage.as_ref(), coordinator.as_ref(), None);
                    let query = QueryRequest {
                        query_text: None,
                        query_vector: Some(planner_vector),
                        k,
                        noun_type_filter: filter.as_ref().and_then(|f| f.noun_types.clone()),
                        attribute_predicate: filter.as_ref().and_then(|f| f.attributes.clone()),
                        from_ids: filter.as_ref().and_then(|f| f.from_ids.clone()),
                        traversal: filter.as_ref().and_then(|f| f.traversal.clone()),
                        alpha: filter.as_ref().map(|f| f.alpha).unwrap_or(1.0),
                        beta: filter.as_ref().map(|f| f.beta).unwrap_or(0.0),
                    };
                    let result = planner.plan(&query).await?;
                    if result.partial {
                        // `partial` only ever reflects shard/candidate level
                        // failures; a wholly empty index is not partial.
                        debug!("find returning a partial result");
                    }
                    Ok(OperationOutcome::SearchHits(result.hits.into_iter().map(|h| (h.id, h.score)).collect()))
                })
            })
            .await?;

        let hits = match outcome {
            OperationOutcome::SearchHits(hits) => hits,
            OperationOutcome::Cancelled => return Err(BrainyError::Cancelled),
            _ => return Err(BrainyError::Internal(anyhow::anyhow!("unexpected outcome shape for find"))),
        };

        self.materialize_hits(hits, request.include_metadata, request.include_vectors).await
    }

    #[instrument(skip(self, request))]
    pub async fn similar(&self, request: SimilarRequest) -> Result<FindResult> {
        let vector = match (request.id, request.vector) {
            (_, Some(vector)) => vector,
            (Some(id), None) => {
                let noun = self.storage.get_noun(id).await?.ok_or(BrainyError::NotFound { id })?;
                noun.vector
            }
            (None, None) => return Err(BrainyError::InvalidInput("similar requires either `id` or `vector`".to_string())),
        };

        let mut result = self
            .find(FindRequest {
                query: None,
                vector: Some(vector),
                k: request.k,
                filter: request.filter,
                include_metadata: false,
                include_vectors: false,
                skip_cache: false,
            })
            .await?;

        if let Some(threshold) = request.threshold {
            result.hits.retain(|hit| hit.score >= threshold);
        }
        Ok(result)
    }

    async fn resolve_query_vector(&self, query: Option<&str>, vector: Option<Vec<f32>>) -> Result<Vec<f32>> {
        match (query, vector) {
            (_, Some(vector)) => {
                if vector.len() != self.dimension {
                    return Err(BrainyError::DimensionMismatch { expected: self.dimension, actual: vector.len() });
                }
                Ok(vector)
            }
            (Some(text), None) => self.embedder.embed(text).await,
            (None, None) => Err(BrainyError::InvalidInput("find requires either `query` or `vector`".to_string())),
        }
    }

    async fn materialize_hits(&self, hits: Vec<(Uuid, f32)>, include_metadata: bool, include_vectors: bool) -> Result<FindResult> {
        let mut out = Vec::with_capacity(hits.len());
        let mut partial = false;
        for (id, score) in hits {
            let noun = if include_metadata || include_vectors {
                match self.storage.get_noun(id).await {
                    Ok(noun) => noun,
                    Err(_) => {
                        partial = true;
                        None
                    }
                }
            } else {
                None
            };
            let noun = noun.map(|mut n| {
                if !include_vectors {
                    n.vector.clear();
                }
                n
            });
            out.push(FindHit { id, score, noun });
        }
        Ok(FindResult { hits: out, partial })
    }

    #[instrument(skip(self))]
    pub async fn get_relations(&self, from: Option<Uuid>, to: Option<Uuid>, verb_type: Option<VerbType>, exclude_dangling: bool) -> Result<Vec<Verb>> {
        let params = serde_json::json!({ "from": from, "to": to, "type": verb_type.map(|t| t.as_str()) });
        let storage = self.storage.clone();
        let outcome = self
            .dispatch(Operation::List, params, move || {
                Box::pin(async move {
                    let mut verbs = match (from, to) {
                        (Some(from), _) => storage.get_verbs_by_source(from).await?,
                        (None, Some(to)) => storage.get_verbs_by_target(to).await?,
                        (None, None) => match verb_type {
                            Some(vt) => storage.get_verbs_by_type(vt).await?,
                            None => return Err(BrainyError::InvalidInput("get_relations requires at least one of from/to/type".to_string())),
                        },
                    };
                    if let Some(to) = to {
                        verbs.retain(|v| v.target_id == to);
                    }
                    if let Some(vt) = verb_type {
                        verbs.retain(|v| v.verb_type == vt);
                    }
                    Ok(OperationOutcome::Verbs(verbs))
                })
            })
            .await?;

        let mut verbs = match outcome {
            OperationOutcome::Verbs(verbs) => verbs,
            OperationOutcome::Cancelled => return Err(BrainyError::Cancelled),
            _ => return Err(BrainyError::Internal(anyhow::anyhow!("unexpected outcome shape for get_relations"))),
        };

        if exclude_dangling {
            let mut kept = Vec::with_capacity(verbs.len());
            for verb in verbs.drain(..) {
                let source_ok = self.storage.get_noun(verb.source_id).await?.is_some();
                let target_ok = self.storage.get_noun(verb.target_id).await?.is_some();
                if source_ok && target_ok {
                    kept.push(verb);
                }
            }
            verbs = kept;
        }
        Ok(verbs)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        self.dispatch(Operation::Clear, serde_json::json!({}), move || {
            Box::pin(async move {
                loop {
                    let page = storage.list_nouns(None, 1000, None).await?;
                    if page.items.is_empty() {
                        break;
                    }
                    for noun in &page.items {
                        storage.delete_noun(noun.id).await?;
                        coordinator.remove_item(noun.id);
                    }
                    if page.next_cursor.is_none() {
                        break;
                    }
                }
                loop {
                    let page = storage.list_verbs(None, 1000, None).await?;
                    if page.items.is_empty() {
                        break;
                    }
                    for verb in &page.items {
                        storage.delete_verb(verb.id).await?;
                    }
                    if page.next_cursor.is_none() {
                        break;
                    }
                }
                Ok(OperationOutcome::Unit)
            })
        })
        .await?;
        Ok(())
    }

    pub fn get_statistics(&self) -> Statistics {
        self.storage.get_statistics()
    }

    /// Runs the relationship classifier directly — not one of the eleven
    /// pipeline operations, just a stateless scoring capability.
    pub fn classify_relationship(&self, input: &ClassifyInput) -> Option<ClassificationResult> {
        self.classifier.classify(input)
    }

    pub fn search_cache_stats(&self) -> crate::search_cache::SearchCacheStats {
        self.search_cache.stats()
    }

    /// `OperationOutcome` has no backup-shaped variant (it only carries what
    /// the other ten operations need), so the builtin closure stashes the
    /// bundle in `slot` and the outcome itself is just `Unit` — augmentations
    /// still see and can short-circuit the call normally.
    #[instrument(skip(self))]
    pub async fn backup(&self) -> Result<BackupBundle> {
        let storage = self.storage.clone();
        let slot: Arc<std::sync::Mutex<Option<BackupBundle>>> = Arc::new(std::sync::Mutex::new(None));
        let slot_write = slot.clone();
        self.dispatch(Operation::Backup, serde_json::json!({}), move || {
            Box::pin(async move {
                let mut nouns = Vec::new();
                let mut cursor = None;
                loop {
                    let page = storage.list_nouns(cursor, 1000, None).await?;
                    nouns.extend(page.items);
                    cursor = page.next_cursor;
                    if cursor.is_none() {
                        break;
                    }
                }
                let mut verbs = Vec::new();
                let mut cursor = None;
                loop {
                    let page = storage.list_verbs(cursor, 1000, None).await?;
                    verbs.extend(page.items);
                    cursor = page.next_cursor;
                    if cursor.is_none() {
                        break;
                    }
                }
                *slot_write.lock().unwrap() = Some(BackupBundle { nouns, verbs });
                Ok(OperationOutcome::Unit)
            })
        })
        .await?;
        Ok(slot.lock().unwrap().take().unwrap_or(BackupBundle { nouns: Vec::new(), verbs: Vec::new() }))
    }

    #[instrument(skip(self, bundle))]
    pub async fn restore(&self, bundle: BackupBundle) -> Result<()> {
        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        let params = serde_json::json!({ "nouns": bundle.nouns.len(), "verbs": bundle.verbs.len() });
        self.dispatch(Operation::Restore, params, move || {
            Box::pin(async move {
                for noun in bundle.nouns {
                    storage.save_noun(noun.clone(), false).await?;
                    coordinator.add_item(noun.id, noun.vector)?;
                }
                for verb in bundle.verbs {
                    storage.save_verb(verb, false).await?;
                }
                Ok(OperationOutcome::Unit)
            })
        })
        .await?;
        Ok(())
    }

    /// Cancels the background maintenance task, waits for it to drain, then
    /// flushes write buffers and statistics (spec §5, SPEC_FULL §F.1).
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
        let handle = self.background.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.storage.flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Brainy {
        BrainyBuilder::new().build(BrainyConfig::default()).await.unwrap()
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let db = db().await;
        let vector = vec![0.0; db.dimension];
        let id = db
            .add(AddRequest { id: None, data: None, vector: Some(vector.clone()), noun_type: NounType::Document, metadata: None, label: Some("hi".to_string()) })
            .await
            .unwrap();
        let noun = db.get(id).await.unwrap().unwrap();
        assert_eq!(noun.vector, vector);
        assert_eq!(noun.label.as_deref(), Some("hi"));
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn delete_then_get_is_none_and_find_excludes_it() {
        let db = db().await;
        let vector = vec![1.0; db.dimension];
        let id = db
            .add(AddRequest { id: None, data: None, vector: Some(vector.clone()), noun_type: NounType::Document, metadata: None, label: None })
            .await
            .unwrap();
        assert!(db.delete(id).await.unwrap());
        assert!(db.get(id).await.unwrap().is_none());

        let result = db.find(FindRequest { query: None, vector: Some(vector), k: 5, filter: None, include_metadata: false, include_vectors: false, skip_cache: true }).await.unwrap();
        assert!(!result.hits.iter().any(|h| h.id == id));
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn relate_requires_both_endpoints_to_exist() {
        let db = db().await;
        let a = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.0; db.dimension]), noun_type: NounType::Person, metadata: None, label: None }).await.unwrap();
        let missing = Uuid::new_v4();
        let result = db.relate(RelateRequest { from: a, to: missing, verb_type: VerbType::EmployedBy, weight: None, metadata: None }).await;
        assert!(matches!(result, Err(BrainyError::NotFound { .. })));
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn get_relations_filters_by_type_and_excludes_dangling() {
        let db = db().await;
        let a = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.0; db.dimension]), noun_type: NounType::Person, metadata: None, label: None }).await.unwrap();
        let b = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.1; db.dimension]), noun_type: NounType::Organization, metadata: None, label: None }).await.unwrap();
        db.relate(RelateRequest { from: a, to: b, verb_type: VerbType::EmployedBy, weight: None, metadata: None }).await.unwrap();

        let relations = db.get_relations(Some(a), None, None, false).await.unwrap();
        assert_eq!(relations.len(), 1);

        db.delete(b).await.unwrap();
        let still_there = db.get_relations(Some(a), None, None, false).await.unwrap();
        assert_eq!(still_there.len(), 1, "dangling verbs stay retrievable by default");
        let excluded = db.get_relations(Some(a), None, None, true).await.unwrap();
        assert!(excluded.is_empty());
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn find_attribute_predicate_filters_results() {
        let db = db().await;
        let vector = vec![0.2; db.dimension];
        let matching = db
            .add(AddRequest { id: None, data: None, vector: vector.clone().into(), noun_type: NounType::Document, metadata: Some(attrs(&[("status", "active")])), label: None })
            .await
            .unwrap();
        db.add(AddRequest { id: None, data: None, vector: vector.clone().into(), noun_type: NounType::Document, metadata: Some(attrs(&[("status", "archived")])), label: None })
            .await
            .unwrap();

        let mut predicate = BTreeMap::new();
        predicate.insert("status".to_string(), "active".to_string());
        let result = db
            .find(FindRequest {
                query: None,
                vector: Some(vector),
                k: 10,
                filter: Some(FindFilter { noun_types: None, attributes: Some(predicate), from_ids: None, traversal: None, alpha: 1.0, beta: 0.0 }),
                include_metadata: false,
                include_vectors: false,
                skip_cache: true,
            })
            .await
            .unwrap();
        assert!(result.hits.iter().all(|h| h.id == matching));
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn clear_empties_nouns_and_verbs() {
        let db = db().await;
        let a = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.0; db.dimension]), noun_type: NounType::Person, metadata: None, label: None }).await.unwrap();
        let b = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.1; db.dimension]), noun_type: NounType::Organization, metadata: None, label: None }).await.unwrap();
        db.relate(RelateRequest { from: a, to: b, verb_type: VerbType::EmployedBy, weight: None, metadata: None }).await.unwrap();

        db.clear().await.unwrap();
        assert!(db.get(a).await.unwrap().is_none());
        assert!(db.get_relations(Some(a), None, None, false).await.unwrap().is_empty());
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips_into_a_fresh_db() {
        let db = db().await;
        let a = db.add(AddRequest { id: None, data: None, vector: Some(vec![0.3; db.dimension]), noun_type: NounType::Person, metadata: None, label: Some("a".to_string()) }).await.unwrap();
        let bundle = db.backup().await.unwrap();
        assert_eq!(bundle.nouns.len(), 1);

        let restored = db().await;
        restored.restore(bundle).await.unwrap();
        assert!(restored.get(a).await.unwrap().is_some());
        db.shutdown().await.unwrap();
        restored.shutdown().await.unwrap();
    }
}
