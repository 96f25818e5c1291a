//! Built-in cache augmentation (spec §4.9: priority 50, around) — serves
//! `search` from the C10 result cache and invalidates it on any mutation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::search_cache::SearchResultCache;

use super::{Augmentation, Next, Operation, OperationContext, OperationOutcome, OperationSet, Timing};

pub const PRIORITY: i32 = 50;

pub struct CacheAugmentation {
    cache: Arc<SearchResultCache>,
}

impl CacheAugmentation {
    pub fn new(cache: Arc<SearchResultCache>) -> Self {
        Self { cache }
    }
}

#[derive(serde::Deserialize)]
struct SearchParams {
    query_vector: Vec<f32>,
    k: usize,
    #[serde(default)]
    filter_digest: Option<String>,
    #[serde(default)]
    skip_cache: bool,
}

#[async_trait]
impl Augmentation for CacheAugmentation {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn timing(&self) -> Timing {
        Timing::Around
    }

    fn operations(&self) -> OperationSet {
        OperationSet::Only(vec![
            Operation::Search,
            Operation::Add,
            Operation::Update,
            Operation::Delete,
            Operation::Relate,
            Operation::Unrelate,
            Operation::Clear,
            Operation::Restore,
        ])
    }

    async fn run_around(&self, ctx: &OperationContext, next: Next) -> Result<OperationOutcome> {
        if ctx.operation != Operation::Search {
            let outcome = next.call().await?;
            self.cache.invalidate_all();
            return Ok(outcome);
        }

        let params: SearchParams = serde_json::from_value(ctx.params.clone())
            .map_err(|e| crate::error::BrainyError::InvalidInput(e.to_string()))?;

        if let Some(hit) = self.cache.get(
            &params.query_vector,
            params.k,
            params.filter_digest.as_deref(),
            params.skip_cache,
        ) {
            return Ok(OperationOutcome::SearchHits(hit));
        }

        let outcome = next.call().await?;
        if let OperationOutcome::SearchHits(ref hits) = outcome {
            self.cache.put(
                &params.query_vector,
                params.k,
                params.filter_digest.as_deref(),
                params.skip_cache,
                hits.clone(),
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn search_ctx(vector: Vec<f32>, k: usize) -> OperationContext {
        OperationContext {
            operation: Operation::Search,
            params: serde_json::json!({ "query_vector": vector, "k": k }),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn second_identical_search_hits_cache_without_calling_next() {
        let cache = Arc::new(SearchResultCache::new(10, Duration::from_secs(60)));
        let aug = CacheAugmentation::new(cache);
        let id = Uuid::new_v4();

        let ctx = search_ctx(vec![1.0, 0.0], 5);
        let next = Next::new(Box::pin(async move { Ok(OperationOutcome::SearchHits(vec![(id, 0.1)])) }));
        aug.run_around(&ctx, next).await.unwrap();

        let ctx2 = search_ctx(vec![1.0, 0.0], 5);
        let next2 = Next::new(Box::pin(async { panic!("should be served from cache") }));
        let outcome = aug.run_around(&ctx2, next2).await.unwrap();
        assert!(matches!(outcome, OperationOutcome::SearchHits(hits) if hits == vec![(id, 0.1)]));
    }

    #[tokio::test]
    async fn mutation_invalidates_the_cache() {
        let cache = Arc::new(SearchResultCache::new(10, Duration::from_secs(60)));
        let aug = CacheAugmentation::new(cache.clone());
        let id = Uuid::new_v4();

        let ctx = search_ctx(vec![1.0, 0.0], 5);
        let next = Next::new(Box::pin(async move { Ok(OperationOutcome::SearchHits(vec![(id, 0.1)])) }));
        aug.run_around(&ctx, next).await.unwrap();
        assert_eq!(cache.stats().len, 1);

        let add_ctx = OperationContext { operation: Operation::Add, params: serde_json::json!({}), session_id: None };
        let next = Next::new(Box::pin(async { Ok(OperationOutcome::Unit) }));
        aug.run_around(&add_ctx, next).await.unwrap();
        assert_eq!(cache.stats().len, 0);
    }
}
