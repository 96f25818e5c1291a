//! Storage engine (C6, spec §4.1) — sharded CRUD for nouns/verbs/metadata/
//! counts over a pluggable backend, wired through C3 (tiered cache), C4
//! (write buffer + request coalescer), and C5 (admission control).

use std::sync::Arc;

use bytes::Bytes;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::backend::{BackendError, StorageBackend};
use crate::cache::{AdmissionControl, Outcome, RequestCoalescer, TieredCache, WriteBuffer};
use crate::error::{BrainyError, ErrorKind, Result};
use crate::types::{Noun, Statistics, Verb};

use super::canonical::to_canonical_bytes;
use super::keyspace::{self, ListCursor};
use super::statistics::StatisticsTracker;

pub type NounFilter<'a> = dyn Fn(&Noun) -> bool + Send + Sync + 'a;
pub type VerbFilter<'a> = dyn Fn(&Verb) -> bool + Send + Sync + 'a;

#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<ListCursor>,
}

/// Invalidation hook into C10 (search cache), set once at construction time
/// by whatever wires the engine together; kept as a trait object so this
/// module doesn't depend on the search-cache module.
pub trait CacheInvalidation: Send + Sync {
    fn invalidate_all(&self);
}

struct NoopInvalidation;
impl CacheInvalidation for NoopInvalidation {
    fn invalidate_all(&self) {}
}

/// Minimal on-disk counts record, loaded at init without paying for the rest
/// of `_system/statistics.json` (spec §4.1: counts recovery is cheap).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
struct Counts {
    total_noun_count: u64,
    total_verb_count: u64,
    noun_counts_by_type: std::collections::HashMap<String, u64>,
    verb_counts_by_type: std::collections::HashMap<String, u64>,
}

pub struct StorageEngine {
    backend: Arc<dyn StorageBackend>,
    admission: Arc<AdmissionControl>,
    noun_cache: std::sync::Mutex<TieredCache<Noun>>,
    verb_cache: std::sync::Mutex<TieredCache<Verb>>,
    noun_coalescer: RequestCoalescer<Noun>,
    verb_coalescer: RequestCoalescer<Verb>,
    noun_buffer: WriteBuffer<Noun>,
    verb_buffer: WriteBuffer<Verb>,
    stats: StatisticsTracker,
    invalidation: std::sync::RwLock<Arc<dyn CacheInvalidation>>,
}

impl StorageEngine {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        admission: Arc<AdmissionControl>,
        hot_cache_size: usize,
        warm_cache_size: usize,
        cache_max_age: std::time::Duration,
    ) -> Self {
        Self {
            backend,
            admission,
            noun_cache: std::sync::Mutex::new(TieredCache::new(
                hot_cache_size,
                warm_cache_size,
                cache_max_age,
            )),
            verb_cache: std::sync::Mutex::new(TieredCache::new(
                hot_cache_size,
                warm_cache_size,
                cache_max_age,
            )),
            noun_coalescer: RequestCoalescer::new(),
            verb_coalescer: RequestCoalescer::new(),
            noun_buffer: WriteBuffer::new(
                crate::cache::DEFAULT_SIZE_THRESHOLD,
                crate::cache::DEFAULT_MAX_DELAY,
            ),
            verb_buffer: WriteBuffer::new(
                crate::cache::DEFAULT_SIZE_THRESHOLD,
                crate::cache::DEFAULT_MAX_DELAY,
            ),
            stats: StatisticsTracker::new(),
            invalidation: std::sync::RwLock::new(Arc::new(NoopInvalidation)),
        }
    }

    pub fn set_invalidation_hook(&self, hook: Arc<dyn CacheInvalidation>) {
        *self.invalidation.write().unwrap() = hook;
    }

    fn invalidate_search_cache(&self) {
        self.invalidation.read().unwrap().invalidate_all();
    }

    /// Loads `_system/counts.json`; falls back to a full recovery scan if
    /// missing (spec §4.1: "the only situation in which a full scan at init
    /// is permitted").
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        self.backend.init().await.map_err(to_brainy_err)?;

        if !self.backend.exists_bucket().await.map_err(to_brainy_err)? {
            // Nothing has ever been written here — skip the counts lookup,
            // which would just be a guaranteed `NotFound`, and the recovery
            // scan has nothing to scan either.
            return Ok(());
        }

        match self.backend.get(keyspace::COUNTS_KEY).await {
            Ok(bytes) => {
                let counts: Counts = serde_json::from_slice(&bytes)
                    .map_err(|e| BrainyError::CorruptedBlob {
                        id: Uuid::nil(),
                        reason: e.to_string(),
                    })?;
                let stats = Statistics {
                    total_noun_count: counts.total_noun_count,
                    total_verb_count: counts.total_verb_count,
                    noun_counts_by_type: counts.noun_counts_by_type,
                    verb_counts_by_type: counts.verb_counts_by_type,
                    field_catalog: Vec::new(),
                    hnsw_index_size: 0,
                };
                self.adopt_snapshot(stats);
            }
            Err(BackendError::NotFound(_)) => {
                warn!("counts.json missing, recovering via full bucket scan");
                self.recover_counts_by_scan().await?;
            }
            Err(e) => return Err(to_brainy_err(e)),
        }

        if let Ok(bytes) = self.backend.get(keyspace::STATISTICS_KEY).await {
            if let Ok(stats) = serde_json::from_slice::<Statistics>(&bytes) {
                self.adopt_snapshot(stats);
            }
        }
        Ok(())
    }

    fn adopt_snapshot(&self, stats: Statistics) {
        let restored = StatisticsTracker::from_snapshot(stats);
        let snapshot = restored.snapshot();
        for (t, count) in &snapshot.noun_counts_by_type {
            for _ in 0..*count {
                self.stats.increment_noun(t);
            }
        }
        for (t, count) in &snapshot.verb_counts_by_type {
            for _ in 0..*count {
                self.stats.increment_verb(t);
            }
        }
        self.stats.set_hnsw_index_size(snapshot.hnsw_index_size);
        self.stats.mark_flushed();
    }

    async fn recover_counts_by_scan(&self) -> Result<()> {
        for shard in keyspace::all_shard_prefixes() {
            let prefix = keyspace::noun_metadata_prefix_for_shard(&shard);
            let mut token = None;
            loop {
                let page = self
                    .backend
                    .list(&prefix, token.as_deref(), 1000)
                    .await
                    .map_err(to_brainy_err)?;
                for key in &page.keys {
                    if let Ok(noun) = self.fetch_noun_blob(key).await {
                        self.stats.increment_noun(noun.noun_type.as_str());
                    }
                }
                if page.next_token.is_none() {
                    break;
                }
                token = page.next_token;
            }
        }
        for shard in keyspace::all_shard_prefixes() {
            let prefix = keyspace::verb_metadata_prefix_for_shard(&shard);
            let mut token = None;
            loop {
                let page = self
                    .backend
                    .list(&prefix, token.as_deref(), 1000)
                    .await
                    .map_err(to_brainy_err)?;
                for key in &page.keys {
                    if let Ok(verb) = self.fetch_verb_blob(key).await {
                        self.stats.increment_verb(verb.verb_type.as_str());
                    }
                }
                if page.next_token.is_none() {
                    break;
                }
                token = page.next_token;
            }
        }
        self.stats.mark_flushed();
        Ok(())
    }

    async fn fetch_noun_blob(&self, metadata_key: &str) -> Result<Noun> {
        let bytes = self.backend.get(metadata_key).await.map_err(to_brainy_err)?;
        serde_json::from_slice(&bytes).map_err(|e| BrainyError::CorruptedBlob {
            id: Uuid::nil(),
            reason: e.to_string(),
        })
    }

    async fn fetch_verb_blob(&self, metadata_key: &str) -> Result<Verb> {
        let bytes = self.backend.get(metadata_key).await.map_err(to_brainy_err)?;
        serde_json::from_slice(&bytes).map_err(|e| BrainyError::CorruptedBlob {
            id: Uuid::nil(),
            reason: e.to_string(),
        })
    }

    // ---- nouns ----

    #[instrument(skip(self, noun), fields(id = %noun.id))]
    pub async fn save_noun(&self, noun: Noun, is_new: bool) -> Result<()> {
        if self.admission.high_volume_mode() {
            self.noun_buffer.add(noun.id, noun.clone());
            self.maybe_flush_nouns().await?;
        } else {
            self.write_noun_through(&noun).await?;
        }
        self.noun_cache.lock().unwrap().insert(noun.id, noun.clone());
        if is_new {
            self.stats.increment_noun(noun.noun_type.as_str());
        }
        self.invalidate_search_cache();
        Ok(())
    }

    /// The vector also lives inside `metadata_bytes` (a `Noun` serializes its
    /// whole self there) — the standalone vector blob exists so
    /// `rehydrate_vectors` can rebuild the HNSW index at startup without
    /// paying to deserialize every noun's attributes.
    async fn write_noun_through(&self, noun: &Noun) -> Result<()> {
        let vector_bytes = Bytes::from(to_canonical_bytes(&noun.vector)?);
        let metadata_bytes = Bytes::from(to_canonical_bytes(noun)?);
        let vector_key = keyspace::noun_vector_key(&noun.id);
        let metadata_key = keyspace::noun_metadata_key(&noun.id);

        let permit = self.admission.acquire().await;
        let result = async {
            self.backend
                .put(&vector_key, vector_bytes, "application/json")
                .await?;
            self.backend
                .put(&metadata_key, metadata_bytes, "application/json")
                .await
        }
        .await;
        release_permit(permit, &result);
        result.map_err(to_brainy_err)
    }

    #[instrument(skip(self))]
    pub async fn get_noun(&self, id: Uuid) -> Result<Option<Noun>> {
        if let Some(noun) = self.noun_cache.lock().unwrap().get(&id) {
            return Ok(Some(noun));
        }
        let backend = self.backend.clone();
        let admission = self.admission.clone();
        let key = keyspace::noun_metadata_key(&id);
        let result = self
            .noun_coalescer
            .get_or_fetch(id, move || async move {
                fetch_entity::<Noun>(backend, admission, key, id).await
            })
            .await;

        match result {
            Ok(noun) => {
                self.noun_cache.lock().unwrap().insert(id, noun.clone());
                Ok(Some(noun))
            }
            Err(e) => match &*e.0 {
                BrainyError::NotFound { .. } => Ok(None),
                _ => Err((*e.0).clone()),
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_noun(&self, id: Uuid) -> Result<bool> {
        let noun = self.get_noun(id).await?;
        let Some(noun) = noun else {
            return Ok(false);
        };

        let vector_key = keyspace::noun_vector_key(&id);
        let metadata_key = keyspace::noun_metadata_key(&id);
        let permit = self.admission.acquire().await;
        let result: std::result::Result<(), BackendError> = async {
            self.backend.delete(&vector_key).await?;
            self.backend.delete(&metadata_key).await
        }
        .await;
        release_permit(permit, &result);
        result.map_err(to_brainy_err)?;

        self.noun_cache.lock().unwrap().remove(&id);
        self.stats.decrement_noun(noun.noun_type.as_str());
        self.invalidate_search_cache();
        Ok(true)
    }

    pub async fn list_nouns(
        &self,
        cursor: Option<ListCursor>,
        limit: usize,
        filter: Option<&NounFilter<'_>>,
    ) -> Result<Page<Noun>> {
        let mut cursor = cursor.unwrap_or_else(ListCursor::start);
        let mut items = Vec::new();
        let shards = keyspace::all_shard_prefixes();

        while cursor.shard_index < shards.len() && items.len() < limit {
            let shard = &shards[cursor.shard_index];
            let prefix = keyspace::noun_metadata_prefix_for_shard(shard);
            let page = self
                .backend
                .list(&prefix, cursor.backend_token.as_deref(), limit - items.len())
                .await
                .map_err(to_brainy_err)?;

            for key in &page.keys {
                let noun = self.fetch_noun_blob(key).await?;
                if filter.map(|f| f(&noun)).unwrap_or(true) {
                    items.push(noun);
                }
                if items.len() >= limit {
                    break;
                }
            }

            if page.next_token.is_some() && items.len() < limit {
                cursor.backend_token = page.next_token;
            } else if items.len() >= limit && page.next_token.is_some() {
                cursor.backend_token = page.next_token;
                return Ok(Page {
                    items,
                    next_cursor: Some(cursor),
                });
            } else {
                cursor = ListCursor::next_shard(cursor.shard_index);
            }
        }

        let next_cursor = if cursor.shard_index < shards.len() {
            Some(cursor)
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    /// Reads only the vector blob per node, skipping the full metadata
    /// document — used to rebuild the in-memory HNSW index at startup
    /// without paying to deserialize every noun's attributes (spec §4.1's
    /// separate `entities/nouns/vectors/` keyspace exists for exactly this).
    pub async fn rehydrate_vectors(&self, cursor: Option<ListCursor>, limit: usize) -> Result<Page<(Uuid, Vec<f32>)>> {
        let mut cursor = cursor.unwrap_or_else(ListCursor::start);
        let mut items = Vec::new();
        let shards = keyspace::all_shard_prefixes();

        while cursor.shard_index < shards.len() && items.len() < limit {
            let shard = &shards[cursor.shard_index];
            let prefix = keyspace::noun_vector_prefix_for_shard(shard);
            let page = self
                .backend
                .list(&prefix, cursor.backend_token.as_deref(), limit - items.len())
                .await
                .map_err(to_brainy_err)?;

            for key in &page.keys {
                let Some(id) = keyspace::id_from_key(key) else { continue };
                let bytes = self.backend.get(key).await.map_err(to_brainy_err)?;
                let vector: Vec<f32> = serde_json::from_slice(&bytes)
                    .map_err(|e| BrainyError::CorruptedBlob { id, reason: e.to_string() })?;
                items.push((id, vector));
                if items.len() >= limit {
                    break;
                }
            }

            if items.len() >= limit && page.next_token.is_some() {
                cursor.backend_token = page.next_token;
                return Ok(Page { items, next_cursor: Some(cursor) });
            } else if page.next_token.is_some() {
                cursor.backend_token = page.next_token;
            } else {
                cursor = ListCursor::next_shard(cursor.shard_index);
            }
        }

        let next_cursor = if cursor.shard_index < shards.len() { Some(cursor) } else { None };
        Ok(Page { items, next_cursor })
    }

    // ---- verbs ----

    #[instrument(skip(self, verb), fields(id = %verb.id))]
    pub async fn save_verb(&self, verb: Verb, is_new: bool) -> Result<()> {
        if self.admission.high_volume_mode() {
            self.verb_buffer.add(verb.id, verb.clone());
            self.maybe_flush_verbs().await?;
        } else {
            self.write_verb_through(&verb).await?;
        }
        self.verb_cache.lock().unwrap().insert(verb.id, verb.clone());
        if is_new {
            self.stats.increment_verb(verb.verb_type.as_str());
        }
        self.invalidate_search_cache();
        Ok(())
    }

    async fn write_verb_through(&self, verb: &Verb) -> Result<()> {
        let vector_bytes = Bytes::from(to_canonical_bytes(&verb.vector)?);
        let metadata_bytes = Bytes::from(to_canonical_bytes(verb)?);
        let vector_key = keyspace::verb_vector_key(&verb.id);
        let metadata_key = keyspace::verb_metadata_key(&verb.id);

        let permit = self.admission.acquire().await;
        let result = async {
            self.backend
                .put(&vector_key, vector_bytes, "application/json")
                .await?;
            self.backend
                .put(&metadata_key, metadata_bytes, "application/json")
                .await
        }
        .await;
        release_permit(permit, &result);
        result.map_err(to_brainy_err)
    }

    #[instrument(skip(self))]
    pub async fn get_verb(&self, id: Uuid) -> Result<Option<Verb>> {
        if let Some(verb) = self.verb_cache.lock().unwrap().get(&id) {
            return Ok(Some(verb));
        }
        let backend = self.backend.clone();
        let admission = self.admission.clone();
        let key = keyspace::verb_metadata_key(&id);
        let result = self
            .verb_coalescer
            .get_or_fetch(id, move || async move {
                fetch_entity::<Verb>(backend, admission, key, id).await
            })
            .await;

        match result {
            Ok(verb) => {
                self.verb_cache.lock().unwrap().insert(id, verb.clone());
                Ok(Some(verb))
            }
            Err(e) => match &*e.0 {
                BrainyError::NotFound { .. } => Ok(None),
                _ => Err((*e.0).clone()),
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_verb(&self, id: Uuid) -> Result<bool> {
        let verb = self.get_verb(id).await?;
        let Some(verb) = verb else {
            return Ok(false);
        };

        let vector_key = keyspace::verb_vector_key(&id);
        let metadata_key = keyspace::verb_metadata_key(&id);
        let permit = self.admission.acquire().await;
        let result: std::result::Result<(), BackendError> = async {
            self.backend.delete(&vector_key).await?;
            self.backend.delete(&metadata_key).await
        }
        .await;
        release_permit(permit, &result);
        result.map_err(to_brainy_err)?;

        self.verb_cache.lock().unwrap().remove(&id);
        self.stats.decrement_verb(verb.verb_type.as_str());
        self.invalidate_search_cache();
        Ok(true)
    }

    pub async fn list_verbs(
        &self,
        cursor: Option<ListCursor>,
        limit: usize,
        filter: Option<&VerbFilter<'_>>,
    ) -> Result<Page<Verb>> {
        let mut cursor = cursor.unwrap_or_else(ListCursor::start);
        let mut items = Vec::new();
        let shards = keyspace::all_shard_prefixes();

        while cursor.shard_index < shards.len() && items.len() < limit {
            let shard = &shards[cursor.shard_index];
            let prefix = keyspace::verb_metadata_prefix_for_shard(shard);
            let page = self
                .backend
                .list(&prefix, cursor.backend_token.as_deref(), limit - items.len())
                .await
                .map_err(to_brainy_err)?;

            for key in &page.keys {
                let verb = self.fetch_verb_blob(key).await?;
                if filter.map(|f| f(&verb)).unwrap_or(true) {
                    items.push(verb);
                }
                if items.len() >= limit {
                    break;
                }
            }

            if items.len() >= limit && page.next_token.is_some() {
                cursor.backend_token = page.next_token;
                return Ok(Page {
                    items,
                    next_cursor: Some(cursor),
                });
            } else if page.next_token.is_some() {
                cursor.backend_token = page.next_token;
            } else {
                cursor = ListCursor::next_shard(cursor.shard_index);
            }
        }

        let next_cursor = if cursor.shard_index < shards.len() {
            Some(cursor)
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    /// Unindexed scans — spec §4.1 permits but does not require secondary
    /// indices for these.
    pub async fn get_verbs_by_source(&self, source_id: Uuid) -> Result<Vec<Verb>> {
        self.scan_all_verbs(move |v| v.source_id == source_id).await
    }

    pub async fn get_verbs_by_target(&self, target_id: Uuid) -> Result<Vec<Verb>> {
        self.scan_all_verbs(move |v| v.target_id == target_id).await
    }

    pub async fn get_verbs_by_type(&self, verb_type: crate::types::VerbType) -> Result<Vec<Verb>> {
        self.scan_all_verbs(move |v| v.verb_type == verb_type).await
    }

    async fn scan_all_verbs(&self, predicate: impl Fn(&Verb) -> bool + Send + Sync) -> Result<Vec<Verb>> {
        let mut out = Vec::new();
        let mut cursor = Some(ListCursor::start());
        loop {
            let page = self.list_verbs(cursor, 1000, Some(&predicate)).await?;
            out.extend(page.items);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(out)
    }

    // ---- write buffer flushing ----

    async fn maybe_flush_nouns(&self) -> Result<()> {
        if !self.noun_buffer.should_flush() {
            return Ok(());
        }
        let items = self.noun_buffer.drain_all();
        let mut failed = Vec::new();
        let writes = items.into_iter().map(|(id, noun)| async move {
            match self.write_noun_through(&noun).await {
                Ok(()) => None,
                Err(_) => Some((id, noun)),
            }
        });
        for result in futures::future::join_all(writes).await {
            if let Some(item) = result {
                failed.push(item);
            }
        }
        self.noun_buffer.readd_failed(failed);
        Ok(())
    }

    async fn maybe_flush_verbs(&self) -> Result<()> {
        if !self.verb_buffer.should_flush() {
            return Ok(());
        }
        let items = self.verb_buffer.drain_all();
        let mut failed = Vec::new();
        let writes = items.into_iter().map(|(id, verb)| async move {
            match self.write_verb_through(&verb).await {
                Ok(()) => None,
                Err(_) => Some((id, verb)),
            }
        });
        for result in futures::future::join_all(writes).await {
            if let Some(item) = result {
                failed.push(item);
            }
        }
        self.verb_buffer.readd_failed(failed);
        Ok(())
    }

    /// Forces both write buffers to drain regardless of threshold, used when
    /// the engine is closing (spec §4.3 flush condition (c)).
    pub async fn flush_all(&self) -> Result<()> {
        let noun_items = self.noun_buffer.drain_all();
        for (_, noun) in noun_items {
            self.write_noun_through(&noun).await?;
        }
        let verb_items = self.verb_buffer.drain_all();
        for (_, verb) in verb_items {
            self.write_verb_through(&verb).await?;
        }
        self.flush_statistics().await
    }

    // ---- statistics & counts ----

    pub fn get_statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    pub fn increment_type_count(&self, kind: EntityKind, type_tag: &str) {
        match kind {
            EntityKind::Noun => self.stats.increment_noun(type_tag),
            EntityKind::Verb => self.stats.increment_verb(type_tag),
        }
    }

    pub fn set_hnsw_index_size(&self, size: u64) {
        self.stats.set_hnsw_index_size(size);
    }

    /// Called from the engine's owner on a periodic tick; only does work if
    /// the min/max flush-lag window says so.
    pub async fn maybe_flush_statistics(&self) -> Result<()> {
        if self.stats.should_flush() || self.stats.overdue() {
            self.flush_statistics().await?;
        }
        Ok(())
    }

    pub async fn flush_statistics(&self) -> Result<()> {
        let snapshot = self.stats.snapshot();
        let counts = Counts {
            total_noun_count: snapshot.total_noun_count,
            total_verb_count: snapshot.total_verb_count,
            noun_counts_by_type: snapshot.noun_counts_by_type.clone(),
            verb_counts_by_type: snapshot.verb_counts_by_type.clone(),
        };

        let stats_bytes = Bytes::from(to_canonical_bytes(&snapshot)?);
        let counts_bytes = Bytes::from(to_canonical_bytes(&counts)?);

        let permit = self.admission.acquire().await;
        let result = async {
            self.backend
                .put(keyspace::STATISTICS_KEY, stats_bytes, "application/json")
                .await?;
            self.backend
                .put(keyspace::COUNTS_KEY, counts_bytes, "application/json")
                .await
        }
        .await;
        release_permit(permit, &result);
        result.map_err(to_brainy_err)?;
        self.stats.mark_flushed();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Noun,
    Verb,
}

async fn fetch_entity<T: serde::de::DeserializeOwned>(
    backend: Arc<dyn StorageBackend>,
    admission: Arc<AdmissionControl>,
    key: String,
    id: Uuid,
) -> std::result::Result<T, BrainyError> {
    let permit = admission.acquire().await;
    let result = backend.get(&key).await;
    release_permit(permit, &result);

    match result {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| BrainyError::CorruptedBlob {
            id,
            reason: e.to_string(),
        }),
        Err(BackendError::NotFound(_)) => Err(BrainyError::NotFound { id }),
        Err(e) => Err(to_brainy_err(e)),
    }
}

fn release_permit<T>(permit: crate::cache::AdmissionPermit<'_>, result: &std::result::Result<T, BackendError>) {
    let outcome = match result {
        Ok(_) => Outcome::Success,
        Err(e) => match crate::error::BrainyError::classify_backend_message(&e.to_string()) {
            ErrorKind::Throttled => Outcome::Throttled,
            _ => Outcome::OtherFailure,
        },
    };
    permit.release(outcome);
}

fn to_brainy_err(e: BackendError) -> BrainyError {
    match e {
        BackendError::NotFound(_) => BrainyError::NotFound { id: Uuid::nil() },
        BackendError::Throttled(msg) => BrainyError::Throttled {
            backoff_hint: None,
        }
        .with_cause(msg),
        BackendError::Transient(msg) => BrainyError::Transient { cause: msg },
        BackendError::Unavailable(msg) => BrainyError::BackendUnavailable(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::types::{CreatorTag, NounType, Timestamp};

    fn sample_noun() -> Noun {
        Noun {
            id: Uuid::new_v4(),
            noun_type: NounType::Document,
            vector: vec![0.1, 0.2, 0.3],
            created_at: Timestamp { seconds: 0, nanoseconds: 0 },
            updated_at: Timestamp { seconds: 0, nanoseconds: 0 },
            creator_tag: CreatorTag::default(),
            label: Some("hello".to_string()),
            attributes: Default::default(),
        }
    }

    fn engine() -> StorageEngine {
        StorageEngine::new(
            Arc::new(MemoryBackend::new()),
            AdmissionControl::new(1000),
            10,
            20,
            std::time::Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let engine = engine();
        engine.init().await.unwrap();
        let noun = sample_noun();
        engine.save_noun(noun.clone(), true).await.unwrap();
        let fetched = engine.get_noun(noun.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, noun.id);
        assert_eq!(engine.get_statistics().total_noun_count, 1);
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let engine = engine();
        engine.init().await.unwrap();
        let noun = sample_noun();
        engine.save_noun(noun.clone(), true).await.unwrap();
        assert!(engine.delete_noun(noun.id).await.unwrap());
        assert!(engine.get_noun(noun.id).await.unwrap().is_none());
        assert_eq!(engine.get_statistics().total_noun_count, 0);
    }

    #[tokio::test]
    async fn rehydrate_vectors_reads_every_saved_vector() {
        let engine = engine();
        engine.init().await.unwrap();
        let mut expected = Vec::new();
        for _ in 0..5 {
            let noun = sample_noun();
            expected.push((noun.id, noun.vector.clone()));
            engine.save_noun(noun, true).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = engine.rehydrate_vectors(cursor, 2).await.unwrap();
            seen.extend(page.items);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        seen.sort_by_key(|(id, _)| *id);
        expected.sort_by_key(|(id, _)| *id);
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn get_missing_noun_is_none_not_error() {
        let engine = engine();
        engine.init().await.unwrap();
        assert!(engine.get_noun(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_nouns_sweeps_all_shards() {
        let engine = engine();
        engine.init().await.unwrap();
        for _ in 0..5 {
            engine.save_noun(sample_noun(), true).await.unwrap();
        }
        let mut seen = 0;
        let mut cursor = None;
        loop {
            let page = engine.list_nouns(cursor, 2, None).await.unwrap();
            seen += page.items.len();
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn counts_survive_statistics_flush_and_reinit() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = StorageEngine::new(
            backend.clone(),
            AdmissionControl::new(1000),
            10,
            20,
            std::time::Duration::from_secs(60),
        );
        engine.init().await.unwrap();
        engine.save_noun(sample_noun(), true).await.unwrap();
        engine.flush_statistics().await.unwrap();

        let reopened = StorageEngine::new(backend, AdmissionControl::new(1000), 10, 20, std::time::Duration::from_secs(60));
        reopened.init().await.unwrap();
        assert_eq!(reopened.get_statistics().total_noun_count, 1);
    }
}
